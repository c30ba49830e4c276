// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::borrow::Cow;

/// A `KeySelector` identifies a particular key in the database.
///
/// The key is resolved relative to an anchor key: `or_equal` selects whether
/// the anchor itself can match, and `offset` shifts the result forward from
/// the last key before (or at) the anchor. The four standard forms are
/// provided as constructors.
#[derive(Clone, Debug)]
pub struct KeySelector<'a> {
    key: Cow<'a, [u8]>,
    or_equal: bool,
    offset: i32,
}

impl<'a> KeySelector<'a> {
    /// Creates a new KeySelector from the given parameters.
    pub const fn new(key: Cow<'a, [u8]>, or_equal: bool, offset: i32) -> Self {
        Self {
            key,
            or_equal,
            offset,
        }
    }

    /// Returns the key that serves as the anchor for this `KeySelector`.
    pub fn key(&self) -> &[u8] {
        self.key.as_ref()
    }

    /// True if the anchor key itself is allowed to match.
    pub fn or_equal(&self) -> bool {
        self.or_equal
    }

    /// The offset from the resolved anchor.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Creates a `KeySelector` that picks the last key less than the anchor.
    pub fn last_less_than<K: Into<Cow<'a, [u8]>>>(key: K) -> Self {
        Self::new(key.into(), false, 0)
    }

    /// Creates a `KeySelector` that picks the last key less than or equal to
    /// the anchor.
    pub fn last_less_or_equal<K: Into<Cow<'a, [u8]>>>(key: K) -> Self {
        Self::new(key.into(), true, 0)
    }

    /// Creates a `KeySelector` that picks the first key greater than the
    /// anchor.
    pub fn first_greater_than<K: Into<Cow<'a, [u8]>>>(key: K) -> Self {
        Self::new(key.into(), true, 1)
    }

    /// Creates a `KeySelector` that picks the first key greater than or equal
    /// to the anchor.
    pub fn first_greater_or_equal<K: Into<Cow<'a, [u8]>>>(key: K) -> Self {
        Self::new(key.into(), false, 1)
    }

    /// Converts into an owned selector with `'static` lifetime.
    pub fn into_owned(self) -> KeySelector<'static> {
        KeySelector {
            key: Cow::Owned(self.key.into_owned()),
            or_equal: self.or_equal,
            offset: self.offset,
        }
    }
}
