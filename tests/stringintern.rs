// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::HashSet;

use futures::executor::block_on;

use layerdb::stringintern::{InternError, StringIntern};
use layerdb::tuple::Subspace;

mod common;

async fn test_intern_roundtrip_async() -> Result<(), InternError> {
    let db = common::database();
    let interner = StringIntern::new(Subspace::from_bytes(b"test-intern"));

    let u1 = interner.intern(&db, "cat").await?;
    let u2 = interner.intern(&db, "dog").await?;
    let u1_again = interner.intern(&db, "cat").await?;

    assert_eq!(u1, u1_again);
    assert_ne!(u1, u2);

    let trx = db.create_trx()?;
    assert_eq!(interner.lookup(&trx, &u1).await?, "cat");
    assert_eq!(interner.lookup(&trx, &u2).await?, "dog");

    Ok(())
}

#[test]
fn test_intern_roundtrip() {
    block_on(test_intern_roundtrip_async()).expect("failed to run");
}

// The cached mapping must survive cold reads: a second interner over the
// same subspace resolves the same identifiers.
async fn test_intern_shared_state_async() -> Result<(), InternError> {
    let db = common::database();
    let first = StringIntern::new(Subspace::from_bytes(b"test-intern"));
    let second = StringIntern::new(Subspace::from_bytes(b"test-intern"));

    let u1 = first.intern(&db, "testing 123456789").await?;
    let u2 = second.intern(&db, "testing 123456789").await?;
    assert_eq!(u1, u2);

    let trx = db.create_trx()?;
    assert_eq!(second.lookup(&trx, &u1).await?, "testing 123456789");

    Ok(())
}

#[test]
fn test_intern_shared_state() {
    block_on(test_intern_shared_state_async()).expect("failed to run");
}

#[test]
fn test_intern_unknown_uid() {
    block_on(async {
        let db = common::database();
        let interner = StringIntern::new(Subspace::from_bytes(b"test-intern"));

        let trx = db.create_trx().unwrap();
        assert!(matches!(
            interner.lookup(&trx, b"nope").await,
            Err(InternError::UidNotFound)
        ));
    });
}

#[test]
fn test_intern_uids_are_distinct() {
    block_on(async {
        let db = common::database();
        let interner = StringIntern::new(Subspace::from_bytes(b"test-intern"));

        let mut uids = HashSet::new();
        for n in 0..200 {
            let uid = interner.intern(&db, &format!("string-{}", n)).await.unwrap();
            assert!(uids.insert(uid), "uid allocated twice");
        }

        // every uid resolves back to its string
        let trx = db.create_trx().unwrap();
        for n in 0..200 {
            let s = format!("string-{}", n);
            let uid = interner.intern(&db, &s).await.unwrap();
            assert_eq!(interner.lookup(&trx, &uid).await.unwrap(), s);
        }
    });
}
