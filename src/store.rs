// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The in-process store engine.
//!
//! A single ordered map guarded by a mutex, with optimistic concurrency
//! control. Each transaction takes a full snapshot of the map at creation
//! and applies its own mutations to that snapshot for read-your-writes.
//! Mutations are also recorded in an operation log which is replayed against
//! the current committed state at commit time, after validating the
//! transaction's read-conflict ranges against every write committed since
//! the transaction's read version. Validation is first-committer-wins on the
//! read set: blind writes never conflict, and atomic operations are writes
//! without reads.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::Mutex;

use crate::error::{code, FdbError, FdbResult};
use crate::keyselector::KeySelector;

/// End of the user keyspace. Keys at or above this prefix are reserved, as in
/// the classic key-value store layout, and the layers never write there.
pub(crate) const KEYSPACE_END: &[u8] = &[0xff];

/// A half-open byte range `[begin, end)`.
pub(crate) type KeyRange = (Vec<u8>, Vec<u8>);

fn ranges_intersect(a: &(Vec<u8>, Vec<u8>), b: &(Vec<u8>, Vec<u8>)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// The first key after `key`, i.e. `key + \x00`.
pub(crate) fn key_after(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(0x00);
    out
}

/// Little-endian signed addition of `param` to `existing`, producing a value
/// of `param`'s width. Missing or short existing values are zero-extended.
pub(crate) fn atomic_add(existing: Option<&[u8]>, param: &[u8]) -> Vec<u8> {
    let width = param.len().min(8).max(1);
    let mut cur = [0u8; 8];
    if let Some(v) = existing {
        let n = v.len().min(8);
        cur[..n].copy_from_slice(&v[..n]);
    }
    let mut add = [0u8; 8];
    let n = param.len().min(8);
    add[..n].copy_from_slice(&param[..n]);

    let sum = i64::from_le_bytes(cur).wrapping_add(i64::from_le_bytes(add));
    sum.to_le_bytes()[..width].to_vec()
}

/// One recorded mutation, replayed in order at commit time.
#[derive(Clone, Debug)]
pub(crate) enum Mutation {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(Vec<u8>, Vec<u8>),
    AtomicAdd(Vec<u8>, Vec<u8>),
}

impl Mutation {
    fn apply(&self, data: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        match self {
            Mutation::Set(k, v) => {
                data.insert(k.clone(), v.clone());
            }
            Mutation::Clear(k) => {
                data.remove(k);
            }
            Mutation::ClearRange(b, e) => {
                let doomed: Vec<Vec<u8>> = data
                    .range::<[u8], _>((Bound::Included(b.as_slice()), Bound::Excluded(e.as_slice())))
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in doomed {
                    data.remove(&k);
                }
            }
            Mutation::AtomicAdd(k, param) => {
                let v = atomic_add(data.get(k).map(|v| v.as_slice()), param);
                data.insert(k.clone(), v);
            }
        }
    }
}

struct CommitRecord {
    version: u64,
    writes: Vec<KeyRange>,
}

struct StoreState {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    version: u64,
    commits: Vec<CommitRecord>,
}

/// The shared store behind a `Database`.
pub(crate) struct Store {
    state: Mutex<StoreState>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Store {
            state: Mutex::new(StoreState {
                data: BTreeMap::new(),
                version: 0,
                commits: Vec::new(),
            }),
        }
    }

    /// Begins a transaction: a snapshot of the data plus its read version.
    pub(crate) fn begin(&self) -> (BTreeMap<Vec<u8>, Vec<u8>>, u64) {
        let state = self.state.lock();
        (state.data.clone(), state.version)
    }

    /// Validates and applies a transaction.
    ///
    /// Fails with `not_committed` if any transaction committed after
    /// `read_version` wrote into one of `reads`.
    pub(crate) fn commit(
        &self,
        read_version: u64,
        reads: &[KeyRange],
        writes: Vec<KeyRange>,
        log: &[Mutation],
    ) -> FdbResult<()> {
        let mut state = self.state.lock();

        for record in state.commits.iter().rev() {
            if record.version <= read_version {
                break;
            }
            for w in &record.writes {
                if reads.iter().any(|r| ranges_intersect(r, w)) {
                    return Err(FdbError::from_code(code::NOT_COMMITTED));
                }
            }
        }

        for m in log {
            m.apply(&mut state.data);
        }

        if !writes.is_empty() {
            state.version += 1;
            let version = state.version;
            state.commits.push(CommitRecord { version, writes });
        }

        Ok(())
    }
}

/// Resolution of a key selector: a position in the total key order.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Resolved {
    /// Before the first key of the keyspace.
    Start,
    /// Exactly at an existing key.
    Key(Vec<u8>),
    /// At or beyond the end of the user keyspace.
    End,
}

impl Resolved {
    /// The concrete boundary bytes of this position.
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            Resolved::Start => Vec::new(),
            Resolved::Key(k) => k,
            Resolved::End => KEYSPACE_END.to_vec(),
        }
    }
}

/// Resolves `selector` against the ordered key set of `view`.
///
/// The anchor position is the last key less than (or less than or equal to,
/// when `or_equal` is set) the selector's key; `offset` then shifts forward
/// from there. Offsets 0 and 1 cover the four standard selector forms.
pub(crate) fn resolve_selector(
    view: &BTreeMap<Vec<u8>, Vec<u8>>,
    selector: &KeySelector,
) -> Resolved {
    let anchor = selector.key();
    match selector.offset() {
        0 => {
            let end = if selector.or_equal() {
                Bound::Included(anchor)
            } else {
                Bound::Excluded(anchor)
            };
            match view.range::<[u8], _>((Bound::Unbounded, end)).next_back() {
                Some((k, _)) => Resolved::Key(k.clone()),
                None => Resolved::Start,
            }
        }
        1 => {
            let begin = if selector.or_equal() {
                Bound::Excluded(anchor)
            } else {
                Bound::Included(anchor)
            };
            match view.range::<[u8], _>((begin, Bound::Unbounded)).next() {
                Some((k, _)) => Resolved::Key(k.clone()),
                None => Resolved::End,
            }
        }
        offset => {
            // General offsets are not used by the layers; resolve by walking.
            let keys: Vec<&Vec<u8>> = view.keys().collect();
            let mut idx: i64 = -1;
            for (i, k) in keys.iter().enumerate() {
                let qualifies = if selector.or_equal() {
                    k.as_slice() <= anchor
                } else {
                    k.as_slice() < anchor
                };
                if qualifies {
                    idx = i as i64;
                } else {
                    break;
                }
            }
            let target = idx + i64::from(offset);
            if target < 0 {
                Resolved::Start
            } else if target >= keys.len() as i64 {
                Resolved::End
            } else {
                Resolved::Key(keys[target as usize].clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(keys: &[&[u8]]) -> BTreeMap<Vec<u8>, Vec<u8>> {
        keys.iter().map(|k| (k.to_vec(), Vec::new())).collect()
    }

    #[test]
    fn test_atomic_add() {
        assert_eq!(
            atomic_add(None, &1i64.to_le_bytes()),
            1i64.to_le_bytes().to_vec()
        );
        assert_eq!(
            atomic_add(Some(&5i64.to_le_bytes()), &(-2i64).to_le_bytes()),
            3i64.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_resolve_selector() {
        let v = view(&[b"b", b"d", b"f"]);

        match resolve_selector(&v, &KeySelector::first_greater_or_equal(&b"d"[..])) {
            Resolved::Key(k) => assert_eq!(k, b"d"),
            other => panic!("unexpected {:?}", other),
        }
        match resolve_selector(&v, &KeySelector::first_greater_than(&b"d"[..])) {
            Resolved::Key(k) => assert_eq!(k, b"f"),
            other => panic!("unexpected {:?}", other),
        }
        match resolve_selector(&v, &KeySelector::last_less_than(&b"d"[..])) {
            Resolved::Key(k) => assert_eq!(k, b"b"),
            other => panic!("unexpected {:?}", other),
        }
        match resolve_selector(&v, &KeySelector::last_less_or_equal(&b"d"[..])) {
            Resolved::Key(k) => assert_eq!(k, b"d"),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            resolve_selector(&v, &KeySelector::last_less_than(&b"a"[..])),
            Resolved::Start
        );
        assert_eq!(
            resolve_selector(&v, &KeySelector::first_greater_than(&b"f"[..])),
            Resolved::End
        );
    }
}
