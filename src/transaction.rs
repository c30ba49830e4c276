// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Interactive transactions over the store engine.
//!
//! A transaction is a mutable snapshot of the database. All read and write
//! operations on a transaction see and modify an otherwise-unchanging version
//! of the database and only change the underlying database if and when the
//! transaction is committed. Read operations see the effects of previous
//! write operations on the same transaction. Committing a transaction
//! usually succeeds in the absence of conflicts.
//!
//! Applications must provide error handling and an appropriate retry loop
//! around the application code for a transaction; `Database::transact_boxed`
//! provides one.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::{Bound, Deref};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{code, FdbError, FdbResult};
use crate::keyselector::KeySelector;
use crate::options::{ConflictRangeType, MutationType, TransactionOption};
use crate::store::{key_after, resolve_selector, KeyRange, Mutation, Store};

/// An owned value read from the store.
pub type FdbSlice = Vec<u8>;

/// A single key-value pair returned by a range read.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl KeyValue {
    /// The key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Consumes the pair, returning its parts.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.key, self.value)
    }
}

/// The result of a range read.
#[derive(Clone, Debug, Default)]
pub struct KeyValues {
    rows: Vec<KeyValue>,
    more: bool,
}

impl KeyValues {
    /// True if the range may contain further rows past the last one returned
    /// (the read stopped at the row limit).
    pub fn more(&self) -> bool {
        self.more
    }
}

impl Deref for KeyValues {
    type Target = [KeyValue];

    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

impl IntoIterator for KeyValues {
    type Item = KeyValue;
    type IntoIter = std::vec::IntoIter<KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a KeyValues {
    type Item = &'a KeyValue;
    type IntoIter = std::slice::Iter<'a, KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// A range of keys to read, defined by a pair of key selectors plus limit and
/// direction.
#[derive(Clone, Debug)]
pub struct RangeOption<'a> {
    /// The beginning of the range, inclusive once resolved.
    pub begin: KeySelector<'a>,
    /// The end of the range, exclusive once resolved.
    pub end: KeySelector<'a>,
    /// If set, the maximum number of rows to return.
    pub limit: Option<usize>,
    /// If true, rows are returned in reverse order beginning at the end of
    /// the range.
    pub reverse: bool,
}

impl<'a> Default for RangeOption<'a> {
    fn default() -> Self {
        Self {
            begin: KeySelector::first_greater_or_equal(Cow::Borrowed(&[][..])),
            end: KeySelector::first_greater_or_equal(Cow::Borrowed(crate::store::KEYSPACE_END)),
            limit: None,
            reverse: false,
        }
    }
}

impl<'a> RangeOption<'a> {
    /// Reverses the range direction.
    pub fn rev(mut self) -> Self {
        self.reverse = true;
        self
    }
}

impl From<(Vec<u8>, Vec<u8>)> for RangeOption<'static> {
    fn from((begin, end): (Vec<u8>, Vec<u8>)) -> Self {
        Self {
            begin: KeySelector::first_greater_or_equal(Cow::Owned(begin)),
            end: KeySelector::first_greater_or_equal(Cow::Owned(end)),
            ..Self::default()
        }
    }
}

impl<'a> From<(&'a [u8], &'a [u8])> for RangeOption<'a> {
    fn from((begin, end): (&'a [u8], &'a [u8])) -> Self {
        Self {
            begin: KeySelector::first_greater_or_equal(Cow::Borrowed(begin)),
            end: KeySelector::first_greater_or_equal(Cow::Borrowed(end)),
            ..Self::default()
        }
    }
}

impl<'a> From<(KeySelector<'a>, KeySelector<'a>)> for RangeOption<'a> {
    fn from((begin, end): (KeySelector<'a>, KeySelector<'a>)) -> Self {
        Self {
            begin,
            end,
            ..Self::default()
        }
    }
}

struct TrxState {
    view: BTreeMap<Vec<u8>, Vec<u8>>,
    read_version: u64,
    log: Vec<Mutation>,
    reads: Vec<KeyRange>,
    writes: Vec<KeyRange>,
    no_write_conflict_next: bool,
    retry_limit: Option<u32>,
    deadline: Option<Instant>,
}

impl TrxState {
    fn check_deadline(&self) -> FdbResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(FdbError::from_code(code::TIMED_OUT))
            }
            _ => Ok(()),
        }
    }

    fn add_read(&mut self, begin: Vec<u8>, end: Vec<u8>) {
        if begin < end {
            self.reads.push((begin, end));
        }
    }

    fn add_write(&mut self, begin: Vec<u8>, end: Vec<u8>) {
        if self.no_write_conflict_next {
            self.no_write_conflict_next = false;
            return;
        }
        if begin < end {
            self.writes.push((begin, end));
        }
    }
}

/// An interactive transaction against a `Database`.
pub struct Transaction {
    store: Arc<Store>,
    state: Mutex<TrxState>,
}

impl Transaction {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        let (view, read_version) = store.begin();
        Transaction {
            store,
            state: Mutex::new(TrxState {
                view,
                read_version,
                log: Vec::new(),
                reads: Vec::new(),
                writes: Vec::new(),
                no_write_conflict_next: false,
                retry_limit: None,
                deadline: None,
            }),
        }
    }

    /// Called to set an option on the transaction.
    pub fn set_option(&self, opt: TransactionOption) -> FdbResult<()> {
        let mut state = self.state.lock();
        match opt {
            TransactionOption::RetryLimit(limit) => state.retry_limit = Some(limit),
            TransactionOption::Timeout(timeout) => {
                state.deadline = Some(Instant::now() + timeout)
            }
            TransactionOption::NextWriteNoWriteConflictRange => {
                state.no_write_conflict_next = true
            }
        }
        Ok(())
    }

    pub(crate) fn retry_limit(&self) -> Option<u32> {
        self.state.lock().retry_limit
    }

    /// Modifies the database snapshot represented by this transaction to
    /// change the given key to have the given value.
    pub fn set(&self, key: &[u8], value: &[u8]) {
        let mut state = self.state.lock();
        state.add_write(key.to_vec(), key_after(key));
        state.view.insert(key.to_vec(), value.to_vec());
        state.log.push(Mutation::Set(key.to_vec(), value.to_vec()));
    }

    /// Modifies the database snapshot represented by this transaction to
    /// remove the given key.
    pub fn clear(&self, key: &[u8]) {
        let mut state = self.state.lock();
        state.add_write(key.to_vec(), key_after(key));
        state.view.remove(key);
        state.log.push(Mutation::Clear(key.to_vec()));
    }

    /// Removes all keys `k` such that `begin <= k < end`.
    pub fn clear_range(&self, begin: &[u8], end: &[u8]) {
        let mut state = self.state.lock();
        state.add_write(begin.to_vec(), end.to_vec());
        let doomed: Vec<Vec<u8>> = state
            .view
            .range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)))
            .map(|(k, _)| k.clone())
            .collect();
        for k in doomed {
            state.view.remove(&k);
        }
        state
            .log
            .push(Mutation::ClearRange(begin.to_vec(), end.to_vec()));
    }

    /// Removes all keys that start with the given prefix.
    pub fn clear_range_startswith(&self, prefix: &[u8]) {
        self.clear_range(prefix, &crate::directory::strinc(prefix.to_vec()));
    }

    /// Performs the operation indicated by `op_type` with operand `param` on
    /// the value stored at `key`.
    ///
    /// An atomic operation is a single database command that carries out
    /// several logical steps: reading the value of a key, performing a
    /// transformation on that value, and writing the result. In regard to
    /// conflict checking it is equivalent to a write without a read: it can
    /// only cause other transactions performing reads of the key to conflict.
    /// This makes atomic operations ideal for operating on keys that are
    /// frequently modified, such as counters.
    pub fn atomic_op(&self, key: &[u8], param: &[u8], op_type: MutationType) {
        let MutationType::Add = op_type;
        let mut state = self.state.lock();
        state.add_write(key.to_vec(), key_after(key));
        let new = crate::store::atomic_add(state.view.get(key).map(|v| v.as_slice()), param);
        state.view.insert(key.to_vec(), new);
        state
            .log
            .push(Mutation::AtomicAdd(key.to_vec(), param.to_vec()));
    }

    /// Reads a value from the database snapshot represented by this
    /// transaction.
    ///
    /// A snapshot read does not add a read conflict range, so it cannot cause
    /// the transaction to conflict; pair it with explicit conflict ranges
    /// where precise serialization is required.
    pub async fn get(&self, key: &[u8], snapshot: bool) -> FdbResult<Option<FdbSlice>> {
        let mut state = self.state.lock();
        state.check_deadline()?;
        if !snapshot {
            state.add_read(key.to_vec(), key_after(key));
        }
        Ok(state.view.get(key).cloned())
    }

    /// Resolves a key selector against the keys in the database snapshot
    /// represented by this transaction.
    pub async fn get_key(&self, selector: &KeySelector<'_>, snapshot: bool) -> FdbResult<FdbSlice> {
        let mut state = self.state.lock();
        state.check_deadline()?;
        let resolved = resolve_selector(&state.view, selector).into_bytes();
        if !snapshot {
            // The resolution depends on every key between the anchor and the
            // resolved key, in whichever order they fall.
            let anchor = selector.key().to_vec();
            let begin = resolved.clone().min(anchor.clone());
            let end = key_after(&resolved).max(anchor);
            state.add_read(begin, end);
        }
        Ok(resolved)
    }

    /// Reads all key-value pairs in the range described by `opt`, up to its
    /// row limit.
    pub async fn get_range(&self, opt: &RangeOption<'_>, snapshot: bool) -> FdbResult<KeyValues> {
        let mut state = self.state.lock();
        state.check_deadline()?;

        let begin = resolve_selector(&state.view, &opt.begin).into_bytes();
        let end = resolve_selector(&state.view, &opt.end).into_bytes();

        let mut rows = Vec::new();
        let mut more = false;
        if begin < end {
            let iter = state
                .view
                .range::<[u8], _>((Bound::Included(begin.as_slice()), Bound::Excluded(end.as_slice())));
            if opt.reverse {
                for (k, v) in iter.rev() {
                    if opt.limit.map_or(false, |limit| rows.len() >= limit) {
                        more = true;
                        break;
                    }
                    rows.push(KeyValue {
                        key: k.clone(),
                        value: v.clone(),
                    });
                }
            } else {
                for (k, v) in iter {
                    if opt.limit.map_or(false, |limit| rows.len() >= limit) {
                        more = true;
                        break;
                    }
                    rows.push(KeyValue {
                        key: k.clone(),
                        value: v.clone(),
                    });
                }
            }
        }

        if !snapshot {
            // The read depends on every key position the scan covered,
            // including gaps between the selector anchors and the keys they
            // resolved to; when the row limit stopped the scan early, only
            // the portion actually read conflicts.
            let floor_begin = begin.clone().min(opt.begin.key().to_vec());
            let floor_end = end.clone().max(opt.end.key().to_vec());
            let (conflict_begin, conflict_end) = if !more {
                (floor_begin, floor_end)
            } else if opt.reverse {
                (
                    rows.last().map(|kv| kv.key.clone()).unwrap_or(floor_begin),
                    floor_end,
                )
            } else {
                (
                    floor_begin,
                    rows.last()
                        .map(|kv| key_after(&kv.key))
                        .unwrap_or(floor_end),
                )
            };
            state.add_read(conflict_begin, conflict_end);
        }

        Ok(KeyValues { rows, more })
    }

    /// Adds a conflict range to the transaction without performing the
    /// associated read or write.
    pub fn add_conflict_range(
        &self,
        begin: &[u8],
        end: &[u8],
        ty: ConflictRangeType,
    ) -> FdbResult<()> {
        if begin > end {
            return Err(FdbError::from_code(code::CLIENT_INVALID_OPERATION));
        }
        let mut state = self.state.lock();
        match ty {
            ConflictRangeType::Read => state.add_read(begin.to_vec(), end.to_vec()),
            ConflictRangeType::Write => {
                if begin < end {
                    state.writes.push((begin.to_vec(), end.to_vec()));
                }
            }
        }
        Ok(())
    }

    /// Adds a conflict range covering the single given key.
    pub fn add_conflict_key(&self, key: &[u8], ty: ConflictRangeType) -> FdbResult<()> {
        self.add_conflict_range(key, &key_after(key), ty)
    }

    /// Attempts to commit the sets and clears previously applied to the
    /// database snapshot represented by this transaction to the actual
    /// database.
    ///
    /// The commit may or may not succeed — in particular, if a conflicting
    /// transaction previously committed, then the commit must fail in order
    /// to preserve transactional isolation, and does so with the retryable
    /// `not_committed` (1020) code.
    pub async fn commit(self) -> FdbResult<()> {
        let state = self.state.into_inner();
        state.check_deadline()?;
        self.store
            .commit(state.read_version, &state.reads, state.writes, &state.log)
    }

    /// Cancels the transaction; none of its mutations will be applied.
    pub fn cancel(self) {}
}
