// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An order-preserving tuple codec.
//!
//! A heterogeneous tuple of primitives is packed into a byte string whose
//! lexicographic order matches the logical order of the tuple values. The
//! encoding is bitwise compatible with the canonical key-value store tuple
//! format for the supported types: byte strings, UTF-8 strings, signed
//! integers up to 64 bits, booleans, UUIDs and nested tuples.

mod element;
pub mod hca;
mod subspace;

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::io;

use memchr::memchr_iter;

pub use self::element::Element;
pub use self::subspace::Subspace;

pub(crate) const NIL: u8 = 0x00;
pub(crate) const BYTES: u8 = 0x01;
pub(crate) const STRING: u8 = 0x02;
pub(crate) const NESTED: u8 = 0x05;
pub(crate) const NEGINTSTART: u8 = 0x0b;
pub(crate) const INTZERO: u8 = 0x14;
pub(crate) const POSINTEND: u8 = 0x1d;
pub(crate) const FALSE: u8 = 0x26;
pub(crate) const TRUE: u8 = 0x27;
#[cfg(feature = "uuid")]
pub(crate) const UUID: u8 = 0x30;

pub(crate) const ESCAPE: u8 = 0xff;

/// Tuple encoding/decoding errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackError {
    /// Unexpected end of the byte stream.
    MissingBytes,
    /// An unexpected type code.
    BadCode {
        found: u8,
        expected: Option<u8>,
    },
    /// String data was not valid UTF-8.
    BadStringFormat,
    /// Input remained after decoding a complete value.
    TrailingBytes,
    /// An integer wider than 64 bits.
    UnsupportedIntLength,
    /// A decoded integer does not fit the requested type.
    IntegerOverflow,
    /// The key does not start with the expected subspace prefix.
    BadPrefix,
    /// UUID data was not 16 bytes.
    #[cfg(feature = "uuid")]
    BadUuidFormat,
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PackError::MissingBytes => write!(f, "unexpected end of input"),
            PackError::BadCode { found, expected } => match expected {
                Some(expected) => {
                    write!(f, "bad type code: found {:#04x}, expected {:#04x}", found, expected)
                }
                None => write!(f, "bad type code: {:#04x}", found),
            },
            PackError::BadStringFormat => write!(f, "invalid UTF-8 in string"),
            PackError::TrailingBytes => write!(f, "trailing bytes after value"),
            PackError::UnsupportedIntLength => write!(f, "integer is wider than 64 bits"),
            PackError::IntegerOverflow => write!(f, "integer does not fit the requested type"),
            PackError::BadPrefix => write!(f, "key is outside the subspace"),
            #[cfg(feature = "uuid")]
            PackError::BadUuidFormat => write!(f, "invalid UUID length"),
        }
    }
}

impl std::error::Error for PackError {}

/// A result with `PackError` defined.
pub type PackResult<T> = std::result::Result<T, PackError>;

/// Tracks the depth of a tuple decoding chain.
///
/// Nested tuples are framed with `NESTED`/`NIL` markers; the root tuple is
/// not. The depth tells an element whether it is at the root.
#[derive(Copy, Clone)]
pub struct TupleDepth(usize);

impl TupleDepth {
    fn new() -> Self {
        TupleDepth(0)
    }

    /// Increments the depth by one; called when packing or unpacking a
    /// tuple-like value inside another value.
    pub fn increment(self) -> Self {
        TupleDepth(self.0 + 1)
    }

    /// The current depth, 0 representing the root.
    pub fn depth(self) -> usize {
        self.0
    }
}

/// A type that can be packed.
pub trait TuplePack {
    fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()>;

    fn pack_root<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.pack(w, TupleDepth::new())
    }

    fn pack_to_vec(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.pack_root(&mut v)
            .expect("tuple encoding should never fail");
        v
    }
}

/// A type that can be unpacked.
pub trait TupleUnpack<'de>: Sized {
    fn unpack(input: &'de [u8], tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)>;

    fn unpack_root(input: &'de [u8]) -> PackResult<Self> {
        let (input, this) = Self::unpack(input, TupleDepth::new())?;
        if !input.is_empty() {
            return Err(PackError::TrailingBytes);
        }
        Ok(this)
    }
}

/// Packs a value into a new Vec.
pub fn pack<T: TuplePack>(v: &T) -> Vec<u8> {
    v.pack_to_vec()
}

/// Packs a value onto the end of an existing buffer.
pub fn pack_into<T: TuplePack>(v: &T, out: &mut Vec<u8>) {
    v.pack_root(out)
        .expect("tuple encoding should never fail");
}

/// Unpacks a complete value from the input.
pub fn unpack<'de, T: TupleUnpack<'de>>(input: &'de [u8]) -> PackResult<T> {
    T::unpack_root(input)
}

impl<'a, T> TuplePack for &'a T
where
    T: TuplePack,
{
    fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()> {
        (*self).pack(w, tuple_depth)
    }
}

pub(crate) fn parse_bytes(input: &[u8], num: usize) -> PackResult<(&[u8], &[u8])> {
    if input.len() < num {
        Err(PackError::MissingBytes)
    } else {
        Ok((&input[num..], &input[..num]))
    }
}

pub(crate) fn parse_byte(input: &[u8]) -> PackResult<(&[u8], u8)> {
    if input.is_empty() {
        Err(PackError::MissingBytes)
    } else {
        Ok((&input[1..], input[0]))
    }
}

pub(crate) fn parse_code(input: &[u8], expected: u8) -> PackResult<&[u8]> {
    let (input, found) = parse_byte(input)?;
    if found == expected {
        Ok(input)
    } else {
        Err(PackError::BadCode {
            found,
            expected: Some(expected),
        })
    }
}

/// Writes a byte string with `NIL` bytes escaped, terminated by `NIL`.
pub(crate) fn write_bytes<W: io::Write>(w: &mut W, v: &[u8]) -> io::Result<()> {
    let mut pos = 0;
    for idx in memchr_iter(NIL, v) {
        let next_idx = idx + 1;
        w.write_all(&v[pos..next_idx])?;
        w.write_all(&[ESCAPE])?;
        pos = next_idx;
    }
    w.write_all(&v[pos..])?;
    w.write_all(&[NIL])?;
    Ok(())
}

/// Parses an escaped, `NIL`-terminated byte string.
pub(crate) fn parse_slice(input: &[u8]) -> PackResult<(&[u8], Cow<'_, [u8]>)> {
    let mut bytes = Vec::new();
    let mut pos = 0;
    for idx in memchr_iter(NIL, input) {
        let next_idx = idx + 1;
        if input.get(next_idx) == Some(&ESCAPE) {
            bytes.extend_from_slice(&input[pos..next_idx]);
            pos = next_idx + 1;
        } else {
            let slice = &input[pos..idx];
            return Ok((
                &input[next_idx..],
                if pos == 0 {
                    Cow::Borrowed(slice)
                } else {
                    bytes.extend_from_slice(slice);
                    Cow::Owned(bytes)
                },
            ));
        }
    }
    Err(PackError::MissingBytes)
}

pub(crate) fn parse_string(input: &[u8]) -> PackResult<(&[u8], Cow<'_, str>)> {
    let (input, slice) = parse_slice(input)?;
    Ok((
        input,
        match slice {
            Cow::Borrowed(slice) => {
                Cow::Borrowed(std::str::from_utf8(slice).map_err(|_| PackError::BadStringFormat)?)
            }
            Cow::Owned(vec) => {
                Cow::Owned(String::from_utf8(vec).map_err(|_| PackError::BadStringFormat)?)
            }
        },
    ))
}

pub(crate) fn pack_int<W: io::Write>(v: i64, w: &mut W) -> io::Result<()> {
    if v >= 0 {
        let u = v as u64;
        let n = 8 - u.leading_zeros() as usize / 8;
        w.write_all(&[INTZERO + n as u8])?;
        w.write_all(&u.to_be_bytes()[8 - n..])
    } else {
        let u = v.wrapping_abs() as u64;
        let n = 8 - u.leading_zeros() as usize / 8;
        w.write_all(&[INTZERO - n as u8])?;
        // minus one turns the one's-complement offset into plain truncation
        w.write_all(&v.wrapping_sub(1).to_be_bytes()[8 - n..])
    }
}

pub(crate) fn unpack_int(input: &[u8]) -> PackResult<(&[u8], i64)> {
    let (input, code) = parse_byte(input)?;
    if (INTZERO..=INTZERO + 8).contains(&code) {
        let n = (code - INTZERO) as usize;
        let (input, bytes) = parse_bytes(input, n)?;
        let mut arr = [0u8; 8];
        arr[8 - n..].copy_from_slice(bytes);
        let u = u64::from_be_bytes(arr);
        if u > i64::MAX as u64 {
            return Err(PackError::IntegerOverflow);
        }
        Ok((input, u as i64))
    } else if (INTZERO - 8..INTZERO).contains(&code) {
        let n = (INTZERO - code) as usize;
        let (input, bytes) = parse_bytes(input, n)?;
        let mut arr = [0xffu8; 8];
        arr[8 - n..].copy_from_slice(bytes);
        Ok((input, i64::from_be_bytes(arr).wrapping_add(1)))
    } else if code == POSINTEND || code == NEGINTSTART {
        Err(PackError::UnsupportedIntLength)
    } else {
        Err(PackError::BadCode {
            found: code,
            expected: None,
        })
    }
}

macro_rules! int_impls {
    ($($ty:ident)*) => {
        $(
            impl TuplePack for $ty {
                fn pack<W: io::Write>(&self, w: &mut W, _tuple_depth: TupleDepth) -> io::Result<()> {
                    pack_int(*self as i64, w)
                }
            }

            impl<'de> TupleUnpack<'de> for $ty {
                fn unpack(input: &'de [u8], _tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
                    let (input, v) = unpack_int(input)?;
                    let v = $ty::try_from(v).map_err(|_| PackError::IntegerOverflow)?;
                    Ok((input, v))
                }
            }
        )*
    };
}

int_impls!(i64 i32 i16 u32 u16 u8);

impl TuplePack for bool {
    fn pack<W: io::Write>(&self, w: &mut W, _tuple_depth: TupleDepth) -> io::Result<()> {
        w.write_all(&[if *self { TRUE } else { FALSE }])
    }
}

impl<'de> TupleUnpack<'de> for bool {
    fn unpack(input: &'de [u8], _tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
        let (input, code) = parse_byte(input)?;
        match code {
            FALSE => Ok((input, false)),
            TRUE => Ok((input, true)),
            found => Err(PackError::BadCode {
                found,
                expected: None,
            }),
        }
    }
}

impl<'a> TuplePack for &'a str {
    fn pack<W: io::Write>(&self, w: &mut W, _tuple_depth: TupleDepth) -> io::Result<()> {
        w.write_all(&[STRING])?;
        write_bytes(w, self.as_bytes())
    }
}

impl TuplePack for String {
    fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()> {
        self.as_str().pack(w, tuple_depth)
    }
}

impl<'de> TupleUnpack<'de> for String {
    fn unpack(input: &'de [u8], _tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
        let input = parse_code(input, STRING)?;
        let (input, s) = parse_string(input)?;
        Ok((input, s.into_owned()))
    }
}

impl<'a> TuplePack for &'a [u8] {
    fn pack<W: io::Write>(&self, w: &mut W, _tuple_depth: TupleDepth) -> io::Result<()> {
        w.write_all(&[BYTES])?;
        write_bytes(w, self)
    }
}

impl TuplePack for Vec<u8> {
    fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()> {
        self.as_slice().pack(w, tuple_depth)
    }
}

impl<'de> TupleUnpack<'de> for Vec<u8> {
    fn unpack(input: &'de [u8], _tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
        let input = parse_code(input, BYTES)?;
        let (input, bytes) = parse_slice(input)?;
        Ok((input, bytes.into_owned()))
    }
}

#[cfg(feature = "uuid")]
impl TuplePack for uuid::Uuid {
    fn pack<W: io::Write>(&self, w: &mut W, _tuple_depth: TupleDepth) -> io::Result<()> {
        w.write_all(&[UUID])?;
        w.write_all(self.as_bytes())
    }
}

#[cfg(feature = "uuid")]
impl<'de> TupleUnpack<'de> for uuid::Uuid {
    fn unpack(input: &'de [u8], _tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
        let input = parse_code(input, UUID)?;
        let (input, bytes) = parse_bytes(input, 16)?;
        let uuid = uuid::Uuid::from_slice(bytes).map_err(|_| PackError::BadUuidFormat)?;
        Ok((input, uuid))
    }
}

impl TuplePack for () {
    fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()> {
        if tuple_depth.depth() > 0 {
            w.write_all(&[NESTED, NIL])?;
        }
        Ok(())
    }
}

impl<'de> TupleUnpack<'de> for () {
    fn unpack(mut input: &'de [u8], tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
        if tuple_depth.depth() > 0 {
            input = parse_code(input, NESTED)?;
            input = parse_code(input, NIL)?;
        }
        Ok((input, ()))
    }
}

macro_rules! tuple_impls {
    ($(($($n:tt $name:ident $v:ident)+))+) => {
        $(
            impl<$($name),+> TuplePack for ($($name,)+)
            where
                $($name: TuplePack,)+
            {
                fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()> {
                    if tuple_depth.depth() > 0 {
                        w.write_all(&[NESTED])?;
                    }

                    $(
                        self.$n.pack(w, tuple_depth.increment())?;
                    )*

                    if tuple_depth.depth() > 0 {
                        w.write_all(&[NIL])?;
                    }
                    Ok(())
                }
            }

            impl<'de, $($name),+> TupleUnpack<'de> for ($($name,)+)
            where
                $($name: TupleUnpack<'de>,)+
            {
                fn unpack(input: &'de [u8], tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
                    let input = if tuple_depth.depth() > 0 { parse_code(input, NESTED)? } else { input };

                    $(
                        let (input, $v) = $name::unpack(input, tuple_depth.increment())?;
                    )*

                    let input = if tuple_depth.depth() > 0 { parse_code(input, NIL)? } else { input };

                    let tuple = ( $($v,)* );
                    Ok((input, tuple))
                }
            }
        )+
    }
}

tuple_impls! {
    (0 T0 t0)
    (0 T0 t0 1 T1 t1)
    (0 T0 t0 1 T1 t1 2 T2 t2)
    (0 T0 t0 1 T1 t1 2 T2 t2 3 T3 t3)
    (0 T0 t0 1 T1 t1 2 T2 t2 3 T3 t3 4 T4 t4)
    (0 T0 t0 1 T1 t1 2 T2 t2 3 T3 t3 4 T4 t4 5 T5 t5)
    (0 T0 t0 1 T1 t1 2 T2 t2 3 T3 t3 4 T4 t4 5 T5 t5 6 T6 t6)
    (0 T0 t0 1 T1 t1 2 T2 t2 3 T3 t3 4 T4 t4 5 T5 t5 6 T6 t6 7 T7 t7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_int() {
        // reference values from the canonical tuple encoding
        assert_eq!(pack(&0i64), vec![0x14]);
        assert_eq!(pack(&1i64), vec![0x15, 1]);
        assert_eq!(pack(&-1i64), vec![0x13, 0xfe]);
        assert_eq!(pack(&255i64), vec![0x15, 0xff]);
        assert_eq!(pack(&256i64), vec![0x16, 1, 0]);
        assert_eq!(pack(&-256i64), vec![0x12, 0xfe, 0xff]);
    }

    #[test]
    fn test_int_roundtrip() {
        for &v in &[
            0i64,
            1,
            -1,
            255,
            -255,
            256,
            -256,
            65535,
            -65536,
            i64::MAX,
            i64::MIN,
        ] {
            let packed = pack(&v);
            let unpacked: i64 = unpack(&packed).unwrap();
            assert_eq!(v, unpacked, "roundtrip of {}", v);
        }
    }

    #[test]
    fn test_int_order() {
        let values = [
            i64::MIN,
            -65536,
            -256,
            -2,
            -1,
            0,
            1,
            2,
            255,
            256,
            65535,
            i64::MAX,
        ];
        for pair in values.windows(2) {
            assert!(
                pack(&pair[0]) < pack(&pair[1]),
                "{} should order before {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_pack_string_and_bytes() {
        assert_eq!(
            pack(&("hello", b"world".to_vec())),
            vec![2, 104, 101, 108, 108, 111, 0, 1, 119, 111, 114, 108, 100, 0]
        );

        let (s, b): (String, Vec<u8>) =
            unpack(&[2, 104, 101, 108, 108, 111, 0, 1, 119, 111, 114, 108, 100, 0]).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(b, b"world");
    }

    #[test]
    fn test_escaped_nil() {
        let v = vec![0u8, 1, 0, 2];
        let packed = pack(&v);
        assert_eq!(packed, vec![1, 0, 0xff, 1, 0, 0xff, 2, 0]);
        let unpacked: Vec<u8> = unpack(&packed).unwrap();
        assert_eq!(v, unpacked);
    }

    #[test]
    fn test_nested_tuple() {
        // canonical encoding of (1, (1,))
        assert_eq!(pack(&(1i64, (1i64,))), vec![21, 1, 5, 21, 1, 0]);
        let v: (i64, (i64,)) = unpack(&[21, 1, 5, 21, 1, 0]).unwrap();
        assert_eq!(v, (1, (1,)));
    }

    #[test]
    fn test_trailing_bytes() {
        assert_eq!(
            unpack::<i64>(&[0x15, 1, 0x15]),
            Err(PackError::TrailingBytes)
        );
    }
}
