// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An ordered set with O(log n) rank queries.
//!
//! Ranked sets support efficient retrieval of elements by their rank as
//! defined by lexicographic order. Elements are inserted into (or removed
//! from) the set by key. The rank of any element can then be quickly
//! determined, and an element can be quickly retrieved by its rank.
//!
//! The set is stored as a multi-level structure. Level 0 holds every member;
//! each higher level holds a sparser sample, and every entry carries the
//! number of level-0 members in the half-open interval between it and the
//! next entry at the same level. A key is promoted to a level when the
//! corresponding low bits of its stable hash are zero, so the structure is
//! deterministic across processes.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use static_assertions::const_assert;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::FdbError;
use crate::options::{ConflictRangeType, MutationType};
use crate::tuple::{PackError, Subspace};
use crate::{KeySelector, RangeOption, TransactError, Transaction};

pub const MAX_LEVELS: usize = 6;
pub const LEVEL_FAN_POW: u32 = 4; // 2^4 members per entry, per level

// every level's promotion mask must fit the 64-bit key hash
const_assert!((MAX_LEVELS as u32) * LEVEL_FAN_POW < 64);

/// Errors from ranked set operations.
#[derive(Debug)]
pub enum RankedSetError {
    /// The empty key is reserved.
    EmptyKey,
    /// A level is missing its expected entry.
    MissingNode,
    /// A stored count is not a valid little-endian 64-bit integer.
    InvalidCount,
    FdbError(FdbError),
    PackError(PackError),
}

impl fmt::Display for RankedSetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RankedSetError::EmptyKey => write!(f, "empty key not allowed in set"),
            RankedSetError::MissingNode => write!(f, "missing level entry"),
            RankedSetError::InvalidCount => write!(f, "invalid level count"),
            RankedSetError::FdbError(err) => err.fmt(f),
            RankedSetError::PackError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for RankedSetError {}

impl From<FdbError> for RankedSetError {
    fn from(err: FdbError) -> Self {
        RankedSetError::FdbError(err)
    }
}

impl From<PackError> for RankedSetError {
    fn from(err: PackError) -> Self {
        RankedSetError::PackError(err)
    }
}

impl TransactError for RankedSetError {
    fn try_into_fdb_error(self) -> Result<FdbError, Self> {
        match self {
            RankedSetError::FdbError(err) => Ok(err),
            other => Err(other),
        }
    }
}

fn encode_count(c: i64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    LittleEndian::write_i64(&mut buf, c);
    buf
}

fn decode_count(v: &[u8]) -> Result<i64, RankedSetError> {
    if v.len() != 8 {
        return Err(RankedSetError::InvalidCount);
    }
    Ok(LittleEndian::read_i64(v))
}

/// An ordered set of byte-string keys with fast rank and selection queries.
///
/// Keys live under `(level, key)` entries in the given subspace; the empty
/// key is reserved as the leftmost sentinel of every level.
#[derive(Debug, Clone)]
pub struct RankedSet {
    subspace: Subspace,
}

impl RankedSet {
    /// Opens (and if needed initializes) a ranked set under `subspace`.
    pub async fn new(trx: &Transaction, subspace: Subspace) -> Result<RankedSet, RankedSetError> {
        let rs = RankedSet { subspace };
        rs.setup_levels(trx).await?;
        Ok(rs)
    }

    async fn setup_levels(&self, trx: &Transaction) -> Result<(), RankedSetError> {
        for level in 0..MAX_LEVELS {
            let key = self.level_key(level, &[]);
            if trx.get(&key, false).await?.is_none() {
                trx.set(&key, &encode_count(0));
            }
        }
        Ok(())
    }

    fn level_key(&self, level: usize, key: &[u8]) -> Vec<u8> {
        self.subspace.pack(&(level as i64, key.to_vec()))
    }

    fn level_subspace(&self, level: usize) -> Subspace {
        self.subspace.subspace(&(level as i64))
    }

    /// Returns the number of items in the set.
    pub async fn size(&self, trx: &Transaction) -> Result<i64, RankedSetError> {
        let rows = trx
            .get_range(&RangeOption::from(&self.level_subspace(MAX_LEVELS - 1)), false)
            .await?;
        let mut size = 0;
        for row in &rows {
            size += decode_count(row.value())?;
        }
        Ok(size)
    }

    /// Checks for the presence of a key in the set.
    pub async fn contains(&self, trx: &Transaction, key: &[u8]) -> Result<bool, RankedSetError> {
        if key.is_empty() {
            return Err(RankedSetError::EmptyKey);
        }
        Ok(trx.get(&self.level_key(0, key), false).await?.is_some())
    }

    /// Inserts a key into the set. No effect if the key is already present.
    pub async fn insert(&self, trx: &Transaction, key: &[u8]) -> Result<(), RankedSetError> {
        if key.is_empty() {
            return Err(RankedSetError::EmptyKey);
        }
        if self.contains(trx, key).await? {
            return Ok(());
        }
        let key_hash = xxh3_64(key);
        for level in 0..MAX_LEVELS {
            let prev_key = self.get_previous_node(trx, level, key).await?;

            let mask = (1u64 << (level as u32 * LEVEL_FAN_POW)) - 1;
            if key_hash & mask != 0 {
                // The key does not live at this level: the previous node's
                // span absorbs it. The add is atomic so concurrent inserts
                // under the same node do not conflict.
                trx.atomic_op(
                    &self.level_key(level, &prev_key),
                    &encode_count(1),
                    MutationType::Add,
                );
            } else {
                // Insert into this level by looking at the count of the
                // previous key in the level and recounting the next lower
                // level to correct the counts.
                let prev_count = decode_count(
                    trx.get(&self.level_key(level, &prev_key), false)
                        .await?
                        .as_deref()
                        .ok_or(RankedSetError::MissingNode)?,
                )?;
                let new_prev_count = self
                    .slow_count(trx, level as i64 - 1, &prev_key, key)
                    .await?;
                let count = prev_count - new_prev_count + 1;

                trx.set(
                    &self.level_key(level, &prev_key),
                    &encode_count(new_prev_count),
                );
                trx.set(&self.level_key(level, key), &encode_count(count));
            }
        }
        Ok(())
    }

    /// Removes a key from the set. No effect if the key is not present.
    pub async fn erase(&self, trx: &Transaction, key: &[u8]) -> Result<(), RankedSetError> {
        if key.is_empty() {
            return Err(RankedSetError::EmptyKey);
        }
        if !self.contains(trx, key).await? {
            return Ok(());
        }
        for level in 0..MAX_LEVELS {
            let k = self.level_key(level, key);
            let count = trx.get(&k, false).await?;
            if count.is_some() {
                trx.clear(&k);
            }
            if level == 0 {
                continue;
            }

            let prev_key = self.get_previous_node(trx, level, key).await?;
            debug_assert_ne!(prev_key.as_slice(), key);
            let mut count_change: i64 = -1;
            if let Some(count) = count {
                count_change += decode_count(&count)?;
            }
            trx.atomic_op(
                &self.level_key(level, &prev_key),
                &encode_count(count_change),
                MutationType::Add,
            );
        }
        Ok(())
    }

    /// Returns the 0-based index of the key within the lexicographically
    /// ordered members, or `None` if the key is not in the set.
    pub async fn rank(
        &self,
        trx: &Transaction,
        key: &[u8],
    ) -> Result<Option<i64>, RankedSetError> {
        if key.is_empty() {
            return Err(RankedSetError::EmptyKey);
        }
        if !self.contains(trx, key).await? {
            return Ok(None);
        }

        let mut r = 0;
        let mut rank_key: Vec<u8> = Vec::new();
        for level in (0..MAX_LEVELS).rev() {
            let lss = self.level_subspace(level);
            let begin = lss.pack(&rank_key);
            let end = KeySelector::first_greater_than(lss.pack(&key.to_vec()));
            let range = RangeOption::from((KeySelector::first_greater_or_equal(begin), end));

            let mut last_count = 0;
            for row in &trx.get_range(&range, false).await? {
                rank_key = lss.unpack(row.key())?;
                last_count = decode_count(row.value())?;
                r += last_count;
            }
            // the last span covers the key itself
            r -= last_count;
            if rank_key.as_slice() == key {
                break;
            }
        }
        Ok(Some(r))
    }

    /// Returns the Nth lexicographically-ordered key in the set (0-based
    /// indexing), or `None` if the rank is out of bounds.
    pub async fn get_nth(
        &self,
        trx: &Transaction,
        rank: i64,
    ) -> Result<Option<Vec<u8>>, RankedSetError> {
        if rank < 0 {
            return Ok(None);
        }
        let mut r = rank;
        let mut key: Vec<u8> = Vec::new();
        for level in (0..MAX_LEVELS).rev() {
            let lss = self.level_subspace(level);
            let begin = lss.pack(&key);
            let (_, end) = lss.range();

            let mut descended = false;
            for row in &trx
                .get_range(&RangeOption::from((begin, end)), false)
                .await?
            {
                key = lss.unpack(row.key())?;
                let count = decode_count(row.value())?;
                if !key.is_empty() && r == 0 {
                    return Ok(Some(key));
                }
                if count > r {
                    descended = true;
                    break;
                }
                r -= count;
            }
            if !descended {
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// Returns the ordered members in the range `[begin_key, end_key)`.
    /// `begin_key` must not be empty.
    pub async fn get_range(
        &self,
        trx: &Transaction,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<Vec<Vec<u8>>, RankedSetError> {
        if begin_key.is_empty() {
            return Err(RankedSetError::EmptyKey);
        }
        let begin = self.level_key(0, begin_key);
        let end = self.level_key(0, end_key);
        let rows = trx
            .get_range(&RangeOption::from((begin, end)), false)
            .await?;
        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let (_, key): (i64, Vec<u8>) = self.subspace.unpack(row.key())?;
            keys.push(key);
        }
        Ok(keys)
    }

    /// Clears the entire set.
    pub async fn clear_all(&self, trx: &Transaction) -> Result<(), RankedSetError> {
        trx.clear_subspace_range(&self.subspace);
        self.setup_levels(trx).await
    }

    // Looks for the previous node on a level, but "doesn't care" about the
    // contents of that node. It therefore uses a non-isolated (snapshot)
    // read and explicitly adds a conflict range that is exclusive of the
    // actual, found previous node. This allows an increment of that node not
    // to trigger a transaction conflict. We also add a conflict key on the
    // found previous key in level 0. This allows detection of erasures.
    async fn get_previous_node(
        &self,
        trx: &Transaction,
        level: usize,
        key: &[u8],
    ) -> Result<Vec<u8>, RankedSetError> {
        let k = self.level_key(level, key);
        let range = RangeOption {
            begin: KeySelector::last_less_than(k.clone()),
            end: KeySelector::first_greater_or_equal(k.clone()),
            limit: Some(1),
            reverse: false,
        };
        let rows = trx.get_range(&range, true).await?;
        let row = rows.first().ok_or(RankedSetError::MissingNode)?;

        let (_, prev_key): (i64, Vec<u8>) = self.subspace.unpack(row.key())?;

        let mut conflict_begin = row.key().to_vec();
        conflict_begin.push(0x00);
        trx.add_conflict_range(&conflict_begin, &k, ConflictRangeType::Read)?;
        trx.add_conflict_key(&self.level_key(0, &prev_key), ConflictRangeType::Read)?;

        Ok(prev_key)
    }

    async fn slow_count(
        &self,
        trx: &Transaction,
        level: i64,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<i64, RankedSetError> {
        if level == -1 {
            return Ok(if begin_key.is_empty() { 0 } else { 1 });
        }
        let begin = self.subspace.pack(&(level, begin_key.to_vec()));
        let end = self.subspace.pack(&(level, end_key.to_vec()));
        let rows = trx
            .get_range(&RangeOption::from((begin, end)), false)
            .await?;
        let mut total = 0;
        for row in &rows {
            total += decode_count(row.value())?;
        }
        Ok(total)
    }
}
