// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use futures::executor::block_on;

use layerdb::directory::directory_layer::DirectoryLayer;
use layerdb::directory::upgrade::{upgrade, UpgradeError, UpgradeOutcome};
use layerdb::directory::Directory;
use layerdb::tuple::{Element, Subspace};
use layerdb::Database;

mod common;

fn root_node() -> Subspace {
    let node_subspace = Subspace::from_bytes(b"\xFE");
    node_subspace.subspace(&node_subspace.bytes())
}

fn node_of(prefix: &[u8]) -> Subspace {
    Subspace::from_bytes(b"\xFE").subspace(&prefix.to_vec())
}

// Writes a pre-versioning subdirectory entry with a byte-string name.
async fn seed_v0_entry(db: &Database, parent: &Subspace, name: &[u8], prefix: &[u8]) {
    let trx = db.create_trx().unwrap();
    let key = parent.pack(&(0i64, Element::Bytes(name.to_vec())));
    trx.set(&key, prefix);
    trx.commit().await.unwrap();
}

#[test]
fn test_upgrade_renames_byte_string_paths() {
    block_on(async {
        let db = common::database();

        seed_v0_entry(&db, &root_node(), b"app", b"\x01\x01").await;
        seed_v0_entry(&db, &node_of(b"\x01\x01"), b"sub", b"\x01\x02").await;

        let directory = DirectoryLayer::default();
        let outcome = upgrade(&db, &directory, false).await.expect("upgrade failed");
        assert_eq!(outcome, UpgradeOutcome::Upgraded);

        // the tree is now addressable with string paths
        let trx = db.create_trx().unwrap();
        assert_eq!(
            directory.list(&trx, vec![]).await.unwrap(),
            vec!["app".to_string()]
        );
        assert_eq!(
            directory.list(&trx, vec!["app".to_string()]).await.unwrap(),
            vec!["sub".to_string()]
        );
        let sub = directory
            .open(
                &trx,
                vec!["app".to_string(), "sub".to_string()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(sub.bytes(), b"\x01\x02");
    });
}

#[test]
fn test_upgrade_is_idempotent() {
    block_on(async {
        let db = common::database();

        seed_v0_entry(&db, &root_node(), b"app", b"\x01\x01").await;

        let directory = DirectoryLayer::default();
        assert_eq!(
            upgrade(&db, &directory, false).await.unwrap(),
            UpgradeOutcome::Upgraded
        );
        assert_eq!(
            upgrade(&db, &directory, false).await.unwrap(),
            UpgradeOutcome::AlreadyCurrent
        );

        // forcing re-runs the pass on an already-upgraded tree
        assert_eq!(
            upgrade(&db, &directory, true).await.unwrap(),
            UpgradeOutcome::Upgraded
        );
    });
}

#[test]
fn test_upgrade_reports_collisions() {
    block_on(async {
        let db = common::database();

        // a byte-string name whose coerced form already exists
        seed_v0_entry(&db, &root_node(), b"dup", b"\x01\x01").await;
        let trx = db.create_trx().unwrap();
        let key = root_node().pack(&(0i64, "dup"));
        trx.set(&key, b"\x01\x02");
        trx.commit().await.unwrap();

        let directory = DirectoryLayer::default();
        match upgrade(&db, &directory, false).await {
            Err(UpgradeError::ValidationFailed(problems)) => {
                assert_eq!(problems.len(), 1);
                assert!(problems[0].contains("already exists"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }

        // nothing was modified: the byte-string entry is still there
        let trx = db.create_trx().unwrap();
        let key = root_node().pack(&(0i64, Element::Bytes(b"dup".to_vec())));
        assert!(trx.get(&key, false).await.unwrap().is_some());
    });
}

#[test]
fn test_upgrade_requires_a_directory() {
    block_on(async {
        let db = common::database();
        let directory = DirectoryLayer::default();
        assert!(matches!(
            upgrade(&db, &directory, false).await,
            Err(UpgradeError::NoDirectoryPresent)
        ));
    });
}
