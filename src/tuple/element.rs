// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A dynamically typed tuple element.

use std::io;

use super::{
    parse_byte, parse_code, unpack_int, PackError, PackResult, TupleDepth, TuplePack, TupleUnpack,
    BYTES, ESCAPE, FALSE, NEGINTSTART, NESTED, NIL, POSINTEND, STRING, TRUE,
};
#[cfg(feature = "uuid")]
use super::UUID;

/// A single tuple element of any supported type.
///
/// Layer APIs that accept "any tuple-encodable item" take and return this
/// type; statically typed code can pack concrete tuples instead.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    /// The nil element.
    Nil,
    /// A byte string.
    Bytes(Vec<u8>),
    /// A UTF-8 string.
    String(String),
    /// A signed 64-bit integer.
    Int(i64),
    /// A boolean.
    Bool(bool),
    /// A nested tuple.
    Tuple(Vec<Element>),
    /// A UUID.
    #[cfg(feature = "uuid")]
    Uuid(uuid::Uuid),
}

impl From<i64> for Element {
    fn from(v: i64) -> Self {
        Element::Int(v)
    }
}

impl From<String> for Element {
    fn from(v: String) -> Self {
        Element::String(v)
    }
}

impl<'a> From<&'a str> for Element {
    fn from(v: &'a str) -> Self {
        Element::String(v.to_string())
    }
}

impl From<Vec<u8>> for Element {
    fn from(v: Vec<u8>) -> Self {
        Element::Bytes(v)
    }
}

impl From<bool> for Element {
    fn from(v: bool) -> Self {
        Element::Bool(v)
    }
}

fn pack_elements<W: io::Write>(
    elements: &[Element],
    w: &mut W,
    tuple_depth: TupleDepth,
) -> io::Result<()> {
    if tuple_depth.depth() > 0 {
        w.write_all(&[NESTED])?;
    }
    for element in elements {
        element.pack(w, tuple_depth.increment())?;
    }
    if tuple_depth.depth() > 0 {
        w.write_all(&[NIL])?;
    }
    Ok(())
}

fn unpack_elements(
    mut input: &[u8],
    tuple_depth: TupleDepth,
) -> PackResult<(&[u8], Vec<Element>)> {
    let nested = tuple_depth.depth() > 0;
    if nested {
        input = parse_code(input, NESTED)?;
    }

    let mut elements = Vec::new();
    loop {
        if input.is_empty() {
            if nested {
                return Err(PackError::MissingBytes);
            }
            break;
        }
        if nested && input[0] == NIL {
            if input.get(1) == Some(&ESCAPE) {
                // an escaped nil element inside the nested tuple
                elements.push(Element::Nil);
                input = &input[2..];
                continue;
            }
            input = &input[1..];
            break;
        }
        let (rest, element) = Element::unpack(input, tuple_depth.increment())?;
        elements.push(element);
        input = rest;
    }
    Ok((input, elements))
}

impl TuplePack for Element {
    fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()> {
        match self {
            Element::Nil => {
                if tuple_depth.depth() > 1 {
                    w.write_all(&[NIL, ESCAPE])
                } else {
                    w.write_all(&[NIL])
                }
            }
            Element::Bytes(v) => v.pack(w, tuple_depth),
            Element::String(v) => v.pack(w, tuple_depth),
            Element::Int(v) => v.pack(w, tuple_depth),
            Element::Bool(v) => v.pack(w, tuple_depth),
            Element::Tuple(v) => pack_elements(v, w, tuple_depth),
            #[cfg(feature = "uuid")]
            Element::Uuid(v) => v.pack(w, tuple_depth),
        }
    }
}

impl<'de> TupleUnpack<'de> for Element {
    fn unpack(input: &'de [u8], tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
        let (_, code) = parse_byte(input)?;
        match code {
            NIL => {
                let input = &input[1..];
                let input = if tuple_depth.depth() > 1 {
                    parse_code(input, ESCAPE)?
                } else {
                    input
                };
                Ok((input, Element::Nil))
            }
            BYTES => {
                let (input, v) = Vec::<u8>::unpack(input, tuple_depth)?;
                Ok((input, Element::Bytes(v)))
            }
            STRING => {
                let (input, v) = String::unpack(input, tuple_depth)?;
                Ok((input, Element::String(v)))
            }
            FALSE | TRUE => {
                let (input, v) = bool::unpack(input, tuple_depth)?;
                Ok((input, Element::Bool(v)))
            }
            NESTED => {
                let depth = if tuple_depth.depth() == 0 {
                    // a bare nested tuple still carries its framing
                    tuple_depth.increment()
                } else {
                    tuple_depth
                };
                let (input, v) = unpack_elements(input, depth)?;
                Ok((input, Element::Tuple(v)))
            }
            code if code >= NEGINTSTART && code <= POSINTEND => {
                let (input, v) = unpack_int(input)?;
                Ok((input, Element::Int(v)))
            }
            #[cfg(feature = "uuid")]
            UUID => {
                let (input, v) = uuid::Uuid::unpack(input, tuple_depth)?;
                Ok((input, Element::Uuid(v)))
            }
            found => Err(PackError::BadCode {
                found,
                expected: None,
            }),
        }
    }
}

impl TuplePack for Vec<Element> {
    fn pack<W: io::Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> io::Result<()> {
        pack_elements(self, w, tuple_depth)
    }
}

impl<'de> TupleUnpack<'de> for Vec<Element> {
    fn unpack(input: &'de [u8], tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
        unpack_elements(input, tuple_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{pack, unpack};

    #[test]
    fn test_element_roundtrip() {
        let elements = vec![
            Element::Nil,
            Element::Bytes(b"raw".to_vec()),
            Element::String("text".to_string()),
            Element::Int(-42),
            Element::Bool(true),
            Element::Tuple(vec![Element::Int(1), Element::String("in".to_string())]),
        ];
        for element in &elements {
            let packed = pack(&(element.clone(),));
            let (out,): (Element,) = unpack(&packed).unwrap();
            assert_eq!(element, &out);
        }
    }

    #[test]
    fn test_element_matches_typed_encoding() {
        assert_eq!(pack(&Element::Int(42)), pack(&42i64));
        assert_eq!(pack(&Element::String("s".to_string())), pack(&"s"));
        assert_eq!(pack(&Element::Bytes(vec![1, 2])), pack(&vec![1u8, 2]));
    }

    #[test]
    fn test_nested_nil_escaping() {
        // canonical encoding of (nil, (nil, nil))
        let v = vec![
            Element::Nil,
            Element::Tuple(vec![Element::Nil, Element::Nil]),
        ];
        assert_eq!(pack(&v), vec![0, 5, 0, 255, 0, 255, 0]);
        let out: Vec<Element> = unpack(&[0, 5, 0, 255, 0, 255, 0]).unwrap();
        assert_eq!(v, out);
    }
}
