// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A sorted set of items with integer scores.
//!
//! Scored sets are collections of items (of any tuple-encodable type)
//! associated with an integer score, in the manner of the Redis "sorted set"
//! data type. Items can be present at most once in the collection, but
//! multiple items can have the same score. Items are sorted and ranked by
//! their scores.
//!
//! A ranked set over the distinct in-use scores provides fast rank
//! operations; a forward index maps each item to its score and a secondary
//! index orders items by score for range retrieval.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FdbError;
use crate::rankedset::{RankedSet, RankedSetError};
use crate::store::key_after;
use crate::tuple::{pack, Element, PackError, Subspace};
use crate::{RangeOption, TransactError, Transaction};

/// Errors from scored set operations.
#[derive(Debug)]
pub enum ScoredSetError {
    /// The item is not in the set.
    ItemNotFound(Element),
    /// A rank argument was negative.
    NegativeRank,
    /// Incrementing the score would overflow.
    ScoreOverflow,
    /// A stored score is not a valid little-endian 64-bit integer.
    InvalidScore,
    RankedSetError(RankedSetError),
    FdbError(FdbError),
    PackError(PackError),
}

impl fmt::Display for ScoredSetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScoredSetError::ItemNotFound(item) => write!(f, "{:?} not found", item),
            ScoredSetError::NegativeRank => write!(f, "rank must be nonnegative"),
            ScoredSetError::ScoreOverflow => write!(f, "score increment overflowed"),
            ScoredSetError::InvalidScore => write!(f, "invalid stored score"),
            ScoredSetError::RankedSetError(err) => err.fmt(f),
            ScoredSetError::FdbError(err) => err.fmt(f),
            ScoredSetError::PackError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ScoredSetError {}

impl From<FdbError> for ScoredSetError {
    fn from(err: FdbError) -> Self {
        ScoredSetError::FdbError(err)
    }
}

impl From<PackError> for ScoredSetError {
    fn from(err: PackError) -> Self {
        ScoredSetError::PackError(err)
    }
}

impl From<RankedSetError> for ScoredSetError {
    fn from(err: RankedSetError) -> Self {
        ScoredSetError::RankedSetError(err)
    }
}

impl TransactError for ScoredSetError {
    fn try_into_fdb_error(self) -> Result<FdbError, Self> {
        match self {
            ScoredSetError::FdbError(err) => Ok(err),
            ScoredSetError::RankedSetError(RankedSetError::FdbError(err)) => Ok(err),
            other => Err(other),
        }
    }
}

fn encode_score(score: i64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    LittleEndian::write_i64(&mut buf, score);
    buf
}

fn decode_score(v: &[u8]) -> Result<i64, ScoredSetError> {
    if v.len() != 8 {
        return Err(ScoredSetError::InvalidScore);
    }
    Ok(LittleEndian::read_i64(v))
}

// A score's ranked-set key is its order-preserving tuple encoding, which is
// never empty and keeps negative scores below positive ones.
fn score_key(score: i64) -> Vec<u8> {
    pack(&score)
}

/// A collection of items ranked by an associated integer score.
#[derive(Debug, Clone)]
pub struct ScoredSet {
    ranked: RankedSet,
    score: Subspace,
    items: Subspace,
}

impl ScoredSet {
    /// Opens (and if needed initializes) a scored set under `subspace`.
    pub async fn new(trx: &Transaction, subspace: Subspace) -> Result<ScoredSet, ScoredSetError> {
        let ranked = RankedSet::new(trx, subspace.subspace(&"R")).await?;
        Ok(ScoredSet {
            ranked,
            score: subspace.subspace(&"S"),
            items: subspace.subspace(&"I"),
        })
    }

    /// Adds an item with the given score, or updates its score if the item
    /// already exists. Returns the previous score, if any.
    pub async fn insert(
        &self,
        trx: &Transaction,
        item: &Element,
        score: i64,
    ) -> Result<Option<i64>, ScoredSetError> {
        let mut old_score = None;
        if let Some(s) = trx.get(&self.score.pack(item), false).await? {
            let old = decode_score(&s)?;
            self.forget_score(trx, item, old).await?;
            old_score = Some(old);
        }
        self.record_score(trx, item, score).await?;
        Ok(old_score)
    }

    /// Increases the score of an item by `delta`. Unlike `insert`, the item
    /// must already be present. Returns the previous score.
    pub async fn increment(
        &self,
        trx: &Transaction,
        item: &Element,
        delta: i64,
    ) -> Result<i64, ScoredSetError> {
        let s = trx
            .get(&self.score.pack(item), false)
            .await?
            .ok_or_else(|| ScoredSetError::ItemNotFound(item.clone()))?;
        let old_score = decode_score(&s)?;
        let score = old_score
            .checked_add(delta)
            .ok_or(ScoredSetError::ScoreOverflow)?;
        self.forget_score(trx, item, old_score).await?;
        self.record_score(trx, item, score).await?;
        Ok(old_score)
    }

    /// Deletes an item, returning its score if it was present.
    pub async fn delete(
        &self,
        trx: &Transaction,
        item: &Element,
    ) -> Result<Option<i64>, ScoredSetError> {
        let s = match trx.get(&self.score.pack(item), false).await? {
            None => return Ok(None),
            Some(s) => s,
        };
        let score = decode_score(&s)?;
        self.forget_score(trx, item, score).await?;
        trx.clear(&self.score.pack(item));
        Ok(Some(score))
    }

    /// Deletes all items in the rank range `[start_rank, stop_rank)`,
    /// returning the distinct scores that became unused.
    pub async fn delete_by_rank(
        &self,
        trx: &Transaction,
        start_rank: i64,
        stop_rank: i64,
    ) -> Result<Vec<i64>, ScoredSetError> {
        match self.rank_range_to_scores(trx, start_rank, stop_rank).await? {
            None => Ok(Vec::new()),
            Some((start_score, stop_score)) => {
                self.delete_by_score(trx, start_score, stop_score).await
            }
        }
    }

    /// Deletes all items in the score range `[start_score, stop_score)`,
    /// returning the distinct scores that became unused.
    pub async fn delete_by_score(
        &self,
        trx: &Transaction,
        start_score: i64,
        stop_score: i64,
    ) -> Result<Vec<i64>, ScoredSetError> {
        let begin = self.items.pack(&start_score);
        let end = self.items.pack(&stop_score);

        let mut erased: Vec<i64> = Vec::new();
        for row in &trx
            .get_range(&RangeOption::from((begin.clone(), end.clone())), false)
            .await?
        {
            let (score, item): (i64, Element) = self.items.unpack(row.key())?;
            trx.clear(&self.score.pack(&item));
            if !erased.contains(&score) {
                self.ranked.erase(trx, &score_key(score)).await?;
                erased.push(score);
            }
        }
        trx.clear_range(&begin, &end);
        Ok(erased)
    }

    /// Returns the items with the given score.
    pub async fn get_items(
        &self,
        trx: &Transaction,
        score: i64,
    ) -> Result<Vec<Element>, ScoredSetError> {
        let rows = trx
            .get_range(&RangeOption::from(&self.items.subspace(&score)), false)
            .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let (_, item): (i64, Element) = self.items.unpack(row.key())?;
            items.push(item);
        }
        Ok(items)
    }

    /// Returns the score associated with an item, or `None` if absent.
    pub async fn get_score(
        &self,
        trx: &Transaction,
        item: &Element,
    ) -> Result<Option<i64>, ScoredSetError> {
        match trx.get(&self.score.pack(item), false).await? {
            None => Ok(None),
            Some(s) => Ok(Some(decode_score(&s)?)),
        }
    }

    /// Returns the items holding the given rank.
    pub async fn get_items_by_rank(
        &self,
        trx: &Transaction,
        rank: i64,
    ) -> Result<Vec<Element>, ScoredSetError> {
        match self.ranked.get_nth(trx, rank).await? {
            None => Ok(Vec::new()),
            Some(key) => {
                let score = crate::tuple::unpack(&key)?;
                self.get_items(trx, score).await
            }
        }
    }

    /// Returns the items in the rank range `[start_rank, stop_rank)`.
    pub async fn get_range_by_rank(
        &self,
        trx: &Transaction,
        start_rank: i64,
        stop_rank: i64,
    ) -> Result<Vec<Element>, ScoredSetError> {
        match self.rank_range_to_scores(trx, start_rank, stop_rank).await? {
            None => Ok(Vec::new()),
            Some((start_score, stop_score)) => {
                self.get_range_by_score(trx, start_score, stop_score, false)
                    .await
            }
        }
    }

    /// Returns the items in the score range `[start_score, stop_score)`.
    /// When `reverse` is set, scores are ordered from high to low.
    pub async fn get_range_by_score(
        &self,
        trx: &Transaction,
        start_score: i64,
        stop_score: i64,
        reverse: bool,
    ) -> Result<Vec<Element>, ScoredSetError> {
        let mut range: RangeOption =
            (self.items.pack(&start_score), self.items.pack(&stop_score)).into();
        range.reverse = reverse;

        let rows = trx.get_range(&range, false).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let (_, item): (i64, Element) = self.items.unpack(row.key())?;
            items.push(item);
        }
        Ok(items)
    }

    /// Returns the rank of an item, or `None` if absent.
    pub async fn get_rank(
        &self,
        trx: &Transaction,
        item: &Element,
    ) -> Result<Option<i64>, ScoredSetError> {
        match self.get_score(trx, item).await? {
            None => Ok(None),
            Some(score) => self.get_rank_by_score(trx, score).await,
        }
    }

    /// Returns the rank of a score, or `None` if no item holds it.
    pub async fn get_rank_by_score(
        &self,
        trx: &Transaction,
        score: i64,
    ) -> Result<Option<i64>, ScoredSetError> {
        Ok(self.ranked.rank(trx, &score_key(score)).await?)
    }

    /// Returns the immediate successors of an item by rank.
    pub async fn get_successors(
        &self,
        trx: &Transaction,
        item: &Element,
    ) -> Result<Vec<Element>, ScoredSetError> {
        match self.get_rank(trx, item).await? {
            None => Ok(Vec::new()),
            Some(rank) => self.get_items_by_rank(trx, rank + 1).await,
        }
    }

    /// Returns the immediate predecessors of an item by rank.
    pub async fn get_predecessors(
        &self,
        trx: &Transaction,
        item: &Element,
    ) -> Result<Vec<Element>, ScoredSetError> {
        match self.get_rank(trx, item).await? {
            None => Ok(Vec::new()),
            Some(rank) => self.get_items_by_rank(trx, rank - 1).await,
        }
    }

    /// Returns the maximum rank, or `None` if the set is empty.
    pub async fn get_max_rank(&self, trx: &Transaction) -> Result<Option<i64>, ScoredSetError> {
        let size = self.ranked.size(trx).await?;
        if size == 0 {
            Ok(None)
        } else {
            Ok(Some(size - 1))
        }
    }

    /// Returns the maximum score, or `None` if the set is empty.
    pub async fn get_max_score(&self, trx: &Transaction) -> Result<Option<i64>, ScoredSetError> {
        let mut range = RangeOption::from(&self.items);
        range.limit = Some(1);
        range.reverse = true;
        let rows = trx.get_range(&range, false).await?;
        match rows.first() {
            None => Ok(None),
            Some(row) => {
                let (score, _): (i64, Element) = self.items.unpack(row.key())?;
                Ok(Some(score))
            }
        }
    }

    /// Returns the number of items in the score range
    /// `[start_score, stop_score)`.
    pub async fn count_by_score(
        &self,
        trx: &Transaction,
        start_score: i64,
        stop_score: i64,
    ) -> Result<usize, ScoredSetError> {
        let range =
            RangeOption::from((self.items.pack(&start_score), self.items.pack(&stop_score)));
        let rows = trx.get_range(&range, false).await?;
        Ok(rows.len())
    }

    /// Returns a cursor over all `(item, score)` pairs, in item order.
    ///
    /// The cursor pages through the set lazily; it is only valid within the
    /// transaction it was created for and can be restarted by calling
    /// `iterate` again in a new transaction.
    pub fn iterate<'a>(&'a self, trx: &'a Transaction) -> ScoredSetIter<'a> {
        let (begin, end) = self.score.range();
        ScoredSetIter {
            set: self,
            trx,
            begin,
            end,
            buffer: Vec::new(),
            next: 0,
            exhausted: false,
        }
    }

    // Removes the item's secondary index entry for `score` and drops the
    // score from the ranked set when no other item still uses it.
    async fn forget_score(
        &self,
        trx: &Transaction,
        item: &Element,
        score: i64,
    ) -> Result<(), ScoredSetError> {
        if self.no_other(trx, item, score).await? {
            self.ranked.erase(trx, &score_key(score)).await?;
        }
        trx.clear(&self.items.pack(&(score, item)));
        Ok(())
    }

    async fn record_score(
        &self,
        trx: &Transaction,
        item: &Element,
        score: i64,
    ) -> Result<(), ScoredSetError> {
        self.ranked.insert(trx, &score_key(score)).await?;
        trx.set(&self.score.pack(item), &encode_score(score));
        trx.set(&self.items.pack(&(score, item)), &[]);
        Ok(())
    }

    /// True if no element other than `item` carries `score`.
    async fn no_other(
        &self,
        trx: &Transaction,
        item: &Element,
        score: i64,
    ) -> Result<bool, ScoredSetError> {
        let mut range = RangeOption::from(&self.items.subspace(&score));
        range.limit = Some(2);
        for row in &trx.get_range(&range, false).await? {
            let (_, other): (i64, Element) = self.items.unpack(row.key())?;
            if &other != item {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Resolves `[start_rank, stop_rank)` to a score range, or `None` when
    /// the rank range selects nothing. A stop rank past the end of the set
    /// maps to `i64::MAX`, the upper sentinel for score ranges.
    async fn rank_range_to_scores(
        &self,
        trx: &Transaction,
        start_rank: i64,
        stop_rank: i64,
    ) -> Result<Option<(i64, i64)>, ScoredSetError> {
        if start_rank < 0 {
            return Err(ScoredSetError::NegativeRank);
        }
        let start_score = match self.ranked.get_nth(trx, start_rank).await? {
            None => return Ok(None),
            Some(key) => crate::tuple::unpack(&key)?,
        };
        let stop_score = if stop_rank > self.ranked.size(trx).await? - 1 {
            i64::MAX
        } else {
            match self.ranked.get_nth(trx, stop_rank).await? {
                None => i64::MAX,
                Some(key) => crate::tuple::unpack(&key)?,
            }
        };
        Ok(Some((start_score, stop_score)))
    }
}

/// A lazy cursor over the `(item, score)` pairs of a `ScoredSet`.
pub struct ScoredSetIter<'a> {
    set: &'a ScoredSet,
    trx: &'a Transaction,
    begin: Vec<u8>,
    end: Vec<u8>,
    buffer: Vec<(Element, i64)>,
    next: usize,
    exhausted: bool,
}

impl<'a> ScoredSetIter<'a> {
    const PAGE: usize = 100;

    /// Returns the next `(item, score)` pair, or `None` at the end.
    pub async fn next(&mut self) -> Result<Option<(Element, i64)>, ScoredSetError> {
        if self.next >= self.buffer.len() {
            if self.exhausted {
                return Ok(None);
            }
            self.fill().await?;
            if self.buffer.is_empty() {
                return Ok(None);
            }
        }
        let pair = self.buffer[self.next].clone();
        self.next += 1;
        Ok(Some(pair))
    }

    async fn fill(&mut self) -> Result<(), ScoredSetError> {
        let mut range: RangeOption = (self.begin.clone(), self.end.clone()).into();
        range.limit = Some(Self::PAGE);

        let rows = self.trx.get_range(&range, false).await?;
        if !rows.more() {
            self.exhausted = true;
        }

        self.buffer.clear();
        self.next = 0;
        for row in &rows {
            let (item,): (Element,) = self.set.score.unpack(row.key())?;
            let score = decode_score(row.value())?;
            self.buffer.push((item, score));
            self.begin = key_after(row.key());
        }
        Ok(())
    }
}
