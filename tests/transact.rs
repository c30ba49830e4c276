// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::executor::block_on;
use futures::FutureExt;

use layerdb::{options, Database, FdbError, TransactOption};

mod common;

#[test]
fn test_transact_success() {
    let db = common::database();
    let res: Result<(), FdbError> = block_on(db.transact_boxed(
        (),
        |trx, _| {
            async move {
                trx.set(b"test", b"1");
                assert_eq!(trx.get(b"test", false).await?.unwrap(), b"1");
                Ok(())
            }
            .boxed()
        },
        TransactOption::default(),
    ));
    res.expect("failed to run");
}

// Makes the key dirty. Transactions that performed a non-snapshot read on
// `key` before this commit will abort.
async fn make_dirty(db: &Database, key: &[u8]) {
    let trx = db.create_trx().unwrap();
    trx.set(key, b"dirty");
    trx.commit().await.unwrap();
}

#[test]
fn test_transact_conflict() {
    const KEY: &[u8] = b"test-transact";
    const RETRY_COUNT: usize = 5;

    let db = common::database();

    let try_count = Arc::new(AtomicUsize::new(0));
    let try_count0 = try_count.clone();
    let db0 = db.clone();

    let fut = db.transact_boxed(
        (),
        move |trx, _| {
            let try_count0 = try_count0.clone();
            let db = db0.clone();
            async move {
                // increment try counter
                try_count0.fetch_add(1, Ordering::SeqCst);

                trx.set_option(options::TransactionOption::RetryLimit(RETRY_COUNT as u32))
                    .expect("failed to set retry limit");

                // update the conflict range
                let _ = trx.get(KEY, false).await?;

                // make the current transaction invalid by making a conflict
                make_dirty(&db, KEY).await;

                trx.set(KEY, b"conflict");
                Ok::<(), FdbError>(())
            }
            .boxed()
        },
        TransactOption::default(),
    );

    block_on(fut).expect_err("commit should have failed");

    // `RetryLimit` does not count the first try, so `try_count` should be
    // equal to `RETRY_COUNT + 1`
    assert_eq!(try_count.load(Ordering::SeqCst), RETRY_COUNT + 1);
}

#[test]
fn test_non_retryable_error_propagates() {
    #[derive(Debug)]
    enum AppError {
        Fdb(FdbError),
        Fatal,
    }

    impl From<FdbError> for AppError {
        fn from(err: FdbError) -> Self {
            AppError::Fdb(err)
        }
    }

    impl layerdb::TransactError for AppError {
        fn try_into_fdb_error(self) -> Result<FdbError, Self> {
            match self {
                AppError::Fdb(err) => Ok(err),
                other => Err(other),
            }
        }
    }

    let db = common::database();
    let tries = Arc::new(AtomicUsize::new(0));
    let tries0 = tries.clone();

    let res: Result<(), AppError> = block_on(db.transact_boxed(
        (),
        move |_trx, _| {
            let tries0 = tries0.clone();
            async move {
                tries0.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Fatal)
            }
            .boxed()
        },
        TransactOption::default(),
    ));

    assert!(matches!(res, Err(AppError::Fatal)));
    assert_eq!(tries.load(Ordering::SeqCst), 1);
}
