// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::HashSet;
use std::iter::FromIterator;

use futures::executor::block_on;
use futures::FutureExt;

use layerdb::tuple::hca::{HcaError, HighContentionAllocator};
use layerdb::tuple::Subspace;
use layerdb::{FdbResult, TransactOption};

mod common;

#[test]
fn test_hca_many_sequential_allocations() {
    block_on(test_hca_many_sequential_allocations_async()).expect("failed to run");
}

async fn test_hca_many_sequential_allocations_async() -> FdbResult<()> {
    const N: usize = 300;
    const KEY: &[u8] = b"test-hca-allocate";

    let db = common::database();

    let hca = HighContentionAllocator::new(Subspace::from_bytes(KEY));

    let mut all_ints = Vec::new();

    for _ in 0..N {
        let trx = db.create_trx()?;

        let next_int: i64 = hca.allocate(&trx).await.unwrap();
        all_ints.push(next_int);

        trx.commit().await?;
    }

    check_hca_result_uniqueness(&all_ints);

    Ok(())
}

#[test]
fn test_hca_concurrent_allocations() {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 50;
    const KEY: &[u8] = b"test-hca-allocate-concurrent";

    let db = common::database();

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let db = db.clone();
            std::thread::spawn(move || {
                let hca = HighContentionAllocator::new(Subspace::from_bytes(KEY));
                let mut ints: Vec<i64> = Vec::with_capacity(PER_WORKER);
                block_on(async {
                    for _ in 0..PER_WORKER {
                        let next_int: Result<i64, HcaError> = db
                            .transact_boxed(
                                &hca,
                                move |trx, hca| hca.allocate(trx).boxed(),
                                TransactOption::default(),
                            )
                            .await;
                        ints.push(next_int.expect("allocation failed"));
                    }
                });
                ints
            })
        })
        .collect();

    let mut all_ints = Vec::new();
    for handle in handles {
        all_ints.extend(handle.join().expect("failed to join worker"));
    }

    check_hca_result_uniqueness(&all_ints);
}

fn check_hca_result_uniqueness(results: &[i64]) {
    let result_set: HashSet<i64> = HashSet::from_iter(results.to_owned());

    if results.len() != result_set.len() {
        panic!(
            "set size does not match, got duplicates from HCA. set: {:?}, list: {:?}",
            result_set.len(),
            results.len(),
        );
    }
}
