// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use byteorder::ByteOrder;
use futures::executor::block_on;

use layerdb::{options, Database, FdbResult};

mod common;

async fn atomic_add(db: &Database, key: &[u8], value: i64) -> FdbResult<()> {
    let trx = db.create_trx()?;

    let mut buf = [0u8; 8];
    byteorder::LE::write_i64(&mut buf, value);
    trx.atomic_op(key, &buf, options::MutationType::Add);

    trx.commit().await
}

#[test]
fn test_atomic() {
    const KEY: &[u8] = b"test-atomic";
    const N: usize = 100;

    let db = common::database();

    // Run `n` add(1) and `n` add(-1) operations from competing threads.
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let db = db.clone();
            std::thread::spawn(move || {
                block_on(async move {
                    for _ in 0..N {
                        let delta = if worker % 2 == 0 { 1 } else { -1 };
                        atomic_add(&db, KEY, delta).await.expect("failed to add");
                    }
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("failed to join worker");
    }

    block_on(async {
        let trx = db.create_trx().unwrap();
        let value = trx
            .get(KEY, false)
            .await
            .expect("failed to get")
            .expect("value should exist");

        // Equal numbers of add/sub operations must net out to zero.
        let v: i64 = byteorder::LE::read_i64(&value);
        assert_eq!(v, 0, "expected 0, found {}", v);
    });
}

#[test]
fn test_atomic_missing_key_starts_at_zero() {
    let db = common::database();

    block_on(async {
        atomic_add(&db, b"test-atomic-fresh", 42).await.unwrap();

        let trx = db.create_trx().unwrap();
        let value = trx.get(b"test-atomic-fresh", false).await.unwrap().unwrap();
        assert_eq!(byteorder::LE::read_i64(&value), 42);
    });
}
