// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A double-ended priority queue.
//!
//! Items are pushed with a specified priority. Items are ordered first by
//! priority, then by push order, then randomly for simultaneous pushes.
//! Items with either the minimum or maximum ordering can be popped or
//! peeked.
//!
//! Two versions of the queue can be instantiated. The high-contention
//! version is designed to support multiple clients popping the queue
//! concurrently: instead of competing for the first item, poppers register
//! requests in a queue and any client may fulfill a batch of outstanding
//! requests. Pop operations in this version incur some overhead, but their
//! performance scales well with the number of clients.
//!
//! In the low-contention version, no attempt is made to avoid transaction
//! conflicts during pop operations. This version performs well with a small
//! number of clients but will not scale as the number of clients grows.
//!
//! The contract for the order of results of pop operations is best effort.
//! Perfect order is achieved in the low-contention version but not in the
//! high-contention version.

use std::fmt;
use std::time::Duration;

use log::{debug, trace};
use rand::RngCore;

use crate::error::{code, FdbError};
use crate::options::ConflictRangeType;
use crate::tuple::{pack, unpack, Element, PackError, Subspace};
use crate::{Database, KeySelector, KeyValue, RangeOption, TransactError, Transaction};

/// How many requests and items a single fulfillment transaction handles.
const FULFILL_BATCH: usize = 100;

const POLL_BACKOFF_START: Duration = Duration::from_millis(10);
const POLL_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Errors from priority queue operations.
#[derive(Debug)]
pub enum QueueError {
    FdbError(FdbError),
    PackError(PackError),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueError::FdbError(err) => err.fmt(f),
            QueueError::PackError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<FdbError> for QueueError {
    fn from(err: FdbError) -> Self {
        QueueError::FdbError(err)
    }
}

impl From<PackError> for QueueError {
    fn from(err: PackError) -> Self {
        QueueError::PackError(err)
    }
}

impl TransactError for QueueError {
    fn try_into_fdb_error(self) -> Result<FdbError, Self> {
        match self {
            QueueError::FdbError(err) => Ok(err),
            other => Err(other),
        }
    }
}

// Relies on good random data from the OS to avoid collisions.
fn random_id() -> Vec<u8> {
    let mut id = vec![0u8; 20];
    rand::thread_rng().fill_bytes(&mut id);
    id
}

fn encode_item(item: &Element) -> Vec<u8> {
    pack(&(item,))
}

fn decode_item(value: &[u8]) -> Result<Element, PackError> {
    let (item,): (Element,) = unpack(value)?;
    Ok(item)
}

enum FastPop {
    Popped(Option<Vec<u8>>),
    Requested(Vec<u8>),
}

/// A double-ended priority queue of tuple-encodable items.
#[derive(Debug, Clone)]
pub struct PriorityQueue {
    subspace: Subspace,
    high_contention: bool,
    pop_request: Subspace,
    requested_item: Subspace,
    item: Subspace,
    member: Subspace,
}

impl PriorityQueue {
    /// Creates a queue under `subspace`. With `high_contention` set, pops go
    /// through the request-queue protocol; otherwise they pop directly.
    pub fn new(subspace: Subspace, high_contention: bool) -> PriorityQueue {
        PriorityQueue {
            high_contention,
            pop_request: subspace.subspace(&"P"),
            requested_item: subspace.subspace(&"R"),
            item: subspace.subspace(&"I"),
            member: subspace.subspace(&"M"),
            subspace,
        }
    }

    /// Removes all items from the queue.
    pub fn clear(&self, trx: &Transaction) {
        trx.clear_subspace_range(&self.subspace);
    }

    /// Pushes a single item onto the queue.
    pub async fn push(
        &self,
        trx: &Transaction,
        item: &Element,
        priority: i64,
    ) -> Result<(), QueueError> {
        let count = self
            .next_count(trx, &self.item.subspace(&priority))
            .await?;
        self.push_at(trx, item, count, priority)
    }

    /// Pops the next item from the queue, or the last if `max` is set.
    ///
    /// Spans multiple transactions in high-contention mode, so it cannot be
    /// composed with other operations in a single transaction.
    pub async fn pop(&self, db: &Database, max: bool) -> Result<Option<Element>, QueueError> {
        let value = if self.high_contention {
            self.pop_high(db, max).await?
        } else {
            self.pop_low_loop(db, max).await?
        };
        match value {
            None => Ok(None),
            Some(value) => Ok(Some(decode_item(&value)?)),
        }
    }

    /// Tests whether the queue is empty.
    pub async fn is_empty(&self, trx: &Transaction) -> Result<bool, QueueError> {
        Ok(self.first_item(trx, false).await?.is_none())
    }

    /// Gets the next item in the queue without popping it.
    pub async fn peek(
        &self,
        trx: &Transaction,
        max: bool,
    ) -> Result<Option<Element>, QueueError> {
        match self.first_item(trx, max).await? {
            None => Ok(None),
            Some(kv) => Ok(Some(decode_item(kv.value())?)),
        }
    }

    /// Tests whether an item is in the queue.
    pub async fn contains(&self, trx: &Transaction, item: &Element) -> Result<bool, QueueError> {
        let mut range = RangeOption::from(&self.member.subspace(item));
        range.limit = Some(1);
        Ok(!trx.get_range(&range, false).await?.is_empty())
    }

    /// Removes an item from an arbitrary position in the queue.
    pub async fn remove(&self, trx: &Transaction, item: &Element) -> Result<(), QueueError> {
        let member_subspace = self.member.subspace(item);
        for member in &trx
            .get_range(&RangeOption::from(&member_subspace), false)
            .await?
        {
            let (priority, count): (i64, i64) = member_subspace.unpack(member.key())?;
            let slot = self.item.subspace(&(priority, count));
            for row in &trx.get_range(&RangeOption::from(&slot), false).await? {
                if decode_item(row.value())? == *item {
                    trx.clear(row.key());
                }
            }
            trx.clear(member.key());
        }
        Ok(())
    }

    // Items are pushed on the queue at a key of (priority, count, random_id).
    // Items pushed at the same time with the same priority may have the same
    // count, so their ordering will be random. This makes pushes fast and
    // usually conflict free (unless the queue becomes empty during the push).
    fn push_at(
        &self,
        trx: &Transaction,
        item: &Element,
        count: i64,
        priority: i64,
    ) -> Result<(), QueueError> {
        let key = self.item.pack(&(priority, count, random_id()));
        // Protect against the unlikely event that someone else got the same
        // random id while writing with the same priority and count.
        trx.add_conflict_key(&key, ConflictRangeType::Read)?;
        trx.set(&key, &encode_item(item));
        trx.set(&self.member.pack(&(item, priority, count)), &[]);
        Ok(())
    }

    // The next count within `subspace`: one past the count of the last key,
    // read at snapshot isolation so concurrent pushes do not conflict here.
    async fn next_count(
        &self,
        trx: &Transaction,
        subspace: &Subspace,
    ) -> Result<i64, QueueError> {
        let (start, stop) = subspace.range();
        let last_key = trx
            .get_key(&KeySelector::last_less_than(stop), true)
            .await?;
        if last_key < start {
            return Ok(0);
        }
        let (count, _): (i64, Vec<u8>) = subspace.unpack(&last_key)?;
        Ok(count + 1)
    }

    async fn first_item(
        &self,
        trx: &Transaction,
        max: bool,
    ) -> Result<Option<KeyValue>, QueueError> {
        let mut range = RangeOption::from(&self.item);
        range.limit = Some(1);
        range.reverse = max;
        let rows = trx.get_range(&range, false).await?;
        Ok(rows.first().cloned())
    }

    // This implementation of pop does not attempt to avoid conflicts. If
    // many clients try to pop simultaneously, only one will be able to
    // succeed at a time.
    async fn pop_low(
        &self,
        trx: &Transaction,
        max: bool,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        let kv = match self.first_item(trx, max).await? {
            None => return Ok(None),
            Some(kv) => kv,
        };
        trx.clear(kv.key());
        let (priority, count, _): (i64, i64, Vec<u8>) = self.item.unpack(kv.key())?;
        let item = decode_item(kv.value())?;
        trx.clear(&self.member.pack(&(item, priority, count)));
        Ok(Some(kv.value().to_vec()))
    }

    async fn pop_low_loop(
        &self,
        db: &Database,
        max: bool,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        loop {
            let trx = db.create_trx()?;
            match self.pop_low(&trx, max).await {
                Ok(value) => match trx.commit().await {
                    Ok(()) => return Ok(value),
                    Err(e) if e.is_retryable() => continue,
                    Err(e) => return Err(e.into()),
                },
                Err(QueueError::FdbError(e)) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    // Registers a pop request. Returns `None` when the request queue is
    // empty and the pop may proceed directly, unless `forced`.
    async fn add_pop_request(
        &self,
        trx: &Transaction,
        forced: bool,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        let count = self.next_count(trx, &self.pop_request).await?;
        if count == 0 && !forced {
            return Ok(None);
        }
        let request_key = self.pop_request.pack(&(count, random_id()));
        // Protect against the unlikely event that someone else got the same
        // random id while adding a pop request.
        trx.add_conflict_key(&request_key, ConflictRangeType::Read)?;
        trx.set(&request_key, &[]);
        Ok(Some(request_key))
    }

    async fn try_fast_pop(
        &self,
        trx: &Transaction,
        max: bool,
    ) -> Result<FastPop, QueueError> {
        match self.add_pop_request(trx, false).await? {
            // No outstanding requests, so just pop.
            None => Ok(FastPop::Popped(self.pop_low(trx, max).await?)),
            Some(request_key) => Ok(FastPop::Requested(request_key)),
        }
    }

    // Retrieves and processes a batch of requests and a batch of items.
    //
    // We initially attempt to retrieve equally sized batches of each.
    // However, the number of outstanding requests need not match the number
    // of available items; either could be larger than the other. We
    // therefore only process a number equal to the smaller of the two.
    // Requests beyond the matched items are drained: their requester will
    // observe an absent result and return `None`.
    async fn fulfill_requested_pops(&self, db: &Database, max: bool) -> Result<(), QueueError> {
        let trx = db.create_trx()?;

        let mut request_range = RangeOption::from(&self.pop_request);
        request_range.limit = Some(FULFILL_BATCH);
        let requests = trx.get_range(&request_range, true).await?;

        let mut item_range = RangeOption::from(&self.item);
        item_range.limit = Some(FULFILL_BATCH);
        item_range.reverse = max;
        let items = trx.get_range(&item_range, true).await?;

        let mut fulfilled = 0;
        for (request, item_kv) in requests.iter().zip(items.iter()) {
            let (_, request_id): (i64, Vec<u8>) = self.pop_request.unpack(request.key())?;
            trx.set(&self.requested_item.pack(&request_id), item_kv.value());
            // serialize against concurrent fulfillers
            trx.add_conflict_key(item_kv.key(), ConflictRangeType::Read)?;
            trx.add_conflict_key(request.key(), ConflictRangeType::Read)?;
            trx.clear(request.key());
            trx.clear(item_kv.key());
            let (priority, count, _): (i64, i64, Vec<u8>) = self.item.unpack(item_kv.key())?;
            let item = decode_item(item_kv.value())?;
            trx.clear(&self.member.pack(&(item, priority, count)));
            fulfilled += 1;
        }

        for request in requests.iter().skip(fulfilled) {
            trx.add_conflict_key(request.key(), ConflictRangeType::Read)?;
            trx.clear(request.key());
        }

        if fulfilled > 0 {
            trace!("fulfilled {} pop request(s)", fulfilled);
        }

        trx.commit().await?;
        Ok(())
    }

    // This implementation of pop avoids conflicts by registering a pop
    // request in a semi-ordered set of requests if it doesn't initially
    // succeed. It then enters a retry loop that attempts to fulfill
    // outstanding requests and checks to see if its request has been
    // fulfilled.
    async fn pop_high(&self, db: &Database, max: bool) -> Result<Option<Vec<u8>>, QueueError> {
        // Check if there are outstanding pop requests. If so, we may not pop
        // before them.
        let mut request_key: Option<Vec<u8>> = None;
        let trx = db.create_trx()?;
        match self.try_fast_pop(&trx, max).await {
            Ok(FastPop::Popped(value)) => {
                if trx.commit().await.is_ok() {
                    return Ok(value);
                }
            }
            Ok(FastPop::Requested(key)) => {
                if trx.commit().await.is_ok() {
                    request_key = Some(key);
                }
            }
            Err(QueueError::FdbError(_)) => {}
            Err(e) => return Err(e),
        }

        // If the first transaction didn't succeed, register our pop request
        // in a separate transaction.
        let request_key = match request_key {
            Some(key) => key,
            None => loop {
                let trx = db.create_trx()?;
                match self.add_pop_request(&trx, true).await {
                    Ok(key) => match trx.commit().await {
                        Ok(()) => match key {
                            Some(key) => break key,
                            None => unreachable!("forced pop request is always registered"),
                        },
                        Err(e) if e.is_retryable() => continue,
                        Err(e) => return Err(e.into()),
                    },
                    Err(QueueError::FdbError(e)) if e.is_retryable() => continue,
                    Err(e) => return Err(e),
                }
            },
        };

        // When the pop request is eventually fulfilled, its result will be
        // stored at a unique key formed from the request's random id.
        let (_, request_id): (i64, Vec<u8>) = self.pop_request.unpack(&request_key)?;
        let result_key = self.requested_item.pack(&request_id);

        debug!("pop request registered, polling for fulfillment");

        let mut backoff = POLL_BACKOFF_START;

        // Attempt to fulfill outstanding requests, then poll the database to
        // check if our request has been fulfilled.
        loop {
            if let Err(err) = self.fulfill_requested_pops(db, max).await {
                match err {
                    QueueError::FdbError(e) if e.code() == code::NOT_COMMITTED => {
                        // Another client has probably fulfilled a batch of
                        // requests; check whether ours is among them.
                    }
                    QueueError::FdbError(e) if e.is_retryable() => continue,
                    err => return Err(err),
                }
            }

            let trx = match db.create_trx() {
                Ok(trx) => trx,
                Err(e) => return Err(e.into()),
            };

            match trx.get(&request_key, false).await {
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e.into()),
                Ok(Some(_)) => {
                    // Our request has not yet been fulfilled; try again.
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(POLL_BACKOFF_MAX);
                    continue;
                }
                Ok(None) => {
                    let value = match trx.get(&result_key, false).await {
                        Err(e) if e.is_retryable() => continue,
                        Err(e) => return Err(e.into()),
                        Ok(None) => return Ok(None),
                        Ok(Some(value)) => value,
                    };
                    trx.clear(&result_key);
                    match trx.commit().await {
                        Ok(()) => return Ok(Some(value)),
                        Err(e) if e.is_retryable() => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}
