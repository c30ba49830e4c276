// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The `Database` handle and the caller-side retry loop.

use std::convert::TryInto;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{FdbError, FdbResult};
use crate::store::Store;
use crate::transaction::Transaction;

/// Represents an ordered, transactional key-value store.
///
/// A mutable, lexicographically ordered mapping from binary keys to binary
/// values. Modifications to a database are performed via transactions.
///
/// Cloning a `Database` yields another handle to the same store.
#[derive(Clone)]
pub struct Database {
    store: Arc<Store>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates a fresh, empty database.
    pub fn new() -> Database {
        Database {
            store: Arc::new(Store::new()),
        }
    }

    /// Creates a new transaction on the given database.
    pub fn create_trx(&self) -> FdbResult<Transaction> {
        Ok(Transaction::new(self.store.clone()))
    }

    /// `transact_boxed` runs a closure inside a retry loop. The closure is
    /// invoked with a newly created transaction; after it resolves, the
    /// transaction is committed automatically. Retryable errors (from the
    /// closure or the commit) restart the loop with a fresh transaction
    /// after an exponential backoff.
    ///
    /// # Warning
    ///
    /// It might retry indefinitely if the transaction is highly contentious.
    /// It is recommended to set `TransactionOption::RetryLimit` or a
    /// `time_out` in `TransactOption` if the task needs to be guaranteed to
    /// finish.
    pub async fn transact_boxed<'trx, F, D, T, E>(
        &'trx self,
        data: D,
        mut f: F,
        options: TransactOption,
    ) -> Result<T, E>
    where
        for<'a> F: FnMut(
            &'a Transaction,
            &'a mut D,
        ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
        E: TransactError,
    {
        let mut data = data;
        let time_out = options.time_out.map(|d| Instant::now() + d);
        let mut tries: u32 = 0;
        loop {
            let trx = self.create_trx().map_err(E::from)?;
            let result = f(&trx, &mut data).await;
            let trx_limit = trx.retry_limit();
            let err = match result {
                Ok(item) => match trx.commit().await {
                    Ok(()) => return Ok(item),
                    Err(e) => e,
                },
                Err(user_err) => match user_err.try_into_fdb_error() {
                    Ok(e) => e,
                    Err(user_err) => return Err(user_err),
                },
            };

            tries += 1;
            let limit = trx_limit.or(options.retry_limit);
            let can_retry = (options.is_idempotent || !err.is_maybe_committed())
                && err.is_retryable()
                && limit.map_or(true, |limit| tries <= limit)
                && time_out.map_or(true, |t| Instant::now() < t);
            if !can_retry {
                return Err(E::from(err));
            }
            std::thread::sleep(retry_backoff(tries));
        }
    }

    /// Like `transact_boxed` for closures whose futures are not `Send`.
    pub async fn transact_boxed_local<'trx, F, D, T, E>(
        &'trx self,
        data: D,
        mut f: F,
        options: TransactOption,
    ) -> Result<T, E>
    where
        for<'a> F:
            FnMut(&'a Transaction, &'a mut D) -> Pin<Box<dyn Future<Output = Result<T, E>> + 'a>>,
        E: TransactError,
    {
        let mut data = data;
        let time_out = options.time_out.map(|d| Instant::now() + d);
        let mut tries: u32 = 0;
        loop {
            let trx = self.create_trx().map_err(E::from)?;
            let result = f(&trx, &mut data).await;
            let trx_limit = trx.retry_limit();
            let err = match result {
                Ok(item) => match trx.commit().await {
                    Ok(()) => return Ok(item),
                    Err(e) => e,
                },
                Err(user_err) => match user_err.try_into_fdb_error() {
                    Ok(e) => e,
                    Err(user_err) => return Err(user_err),
                },
            };

            tries += 1;
            let limit = trx_limit.or(options.retry_limit);
            let can_retry = (options.is_idempotent || !err.is_maybe_committed())
                && err.is_retryable()
                && limit.map_or(true, |limit| tries <= limit)
                && time_out.map_or(true, |t| Instant::now() < t);
            if !can_retry {
                return Err(E::from(err));
            }
            std::thread::sleep(retry_backoff(tries));
        }
    }
}

/// Exponential backoff between retries, capped at half a second.
pub(crate) fn retry_backoff(tries: u32) -> Duration {
    let ms = 2u64.saturating_mul(1 << tries.min(8).saturating_sub(1));
    Duration::from_millis(ms.min(500))
}

/// A trait that must be implemented to use `Database::transact_boxed` with
/// application error types.
pub trait TransactError: From<FdbError> {
    fn try_into_fdb_error(self) -> Result<FdbError, Self>;
}

impl<T> TransactError for T
where
    T: From<FdbError> + TryInto<FdbError, Error = T>,
{
    fn try_into_fdb_error(self) -> Result<FdbError, Self> {
        self.try_into()
    }
}

impl TransactError for FdbError {
    fn try_into_fdb_error(self) -> Result<FdbError, Self> {
        Ok(self)
    }
}

/// A set of options that controls the behavior of `Database::transact_boxed`.
#[derive(Default, Clone)]
pub struct TransactOption {
    pub retry_limit: Option<u32>,
    pub time_out: Option<Duration>,
    pub is_idempotent: bool,
}

impl TransactOption {
    /// An idempotent TransactOption
    pub fn idempotent() -> Self {
        Self {
            is_idempotent: true,
            ..TransactOption::default()
        }
    }
}
