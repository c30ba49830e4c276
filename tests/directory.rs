// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use byteorder::{LittleEndian, WriteBytesExt};
use futures::executor::block_on;

use layerdb::directory::directory_layer::DirectoryLayer;
use layerdb::directory::error::DirectoryError;
use layerdb::directory::{Directory, DirectoryOutput};
use layerdb::tuple::Subspace;

mod common;

fn path(elements: &[&str]) -> Vec<String> {
    elements.iter().map(|s| s.to_string()).collect()
}

async fn test_create_list_move_remove_async() -> Result<(), DirectoryError> {
    let db = common::database();
    let directory = DirectoryLayer::default();

    {
        let trx = db.create_trx()?;
        let ab = directory
            .create_or_open(&trx, path(&["a", "b"]), None, None)
            .await?;
        assert_eq!(ab.get_path(), path(&["a", "b"]));

        // the parent was created along the way
        assert!(directory.exists(&trx, path(&["a"])).await?);
        assert_eq!(directory.list(&trx, vec![]).await?, path(&["a"]));
        assert_eq!(directory.list(&trx, path(&["a"])).await?, path(&["b"]));
        trx.commit().await?;
    }

    // opening returns the same physical prefix
    let prefix = {
        let trx = db.create_trx()?;
        let opened = directory.open(&trx, path(&["a", "b"]), None).await?;
        opened.bytes().to_vec()
    };

    {
        let trx = db.create_trx()?;
        let moved = directory
            .move_to(&trx, path(&["a", "b"]), path(&["a", "c"]))
            .await?;
        assert_eq!(moved.bytes(), prefix.as_slice());
        assert_eq!(moved.get_path(), path(&["a", "c"]));
        trx.commit().await?;
    }

    {
        let trx = db.create_trx()?;
        assert_eq!(directory.list(&trx, path(&["a"])).await?, path(&["c"]));
        assert!(!directory.exists(&trx, path(&["a", "b"])).await?);

        // the physical prefix is unchanged by the move
        let opened = directory.open(&trx, path(&["a", "c"]), None).await?;
        assert_eq!(opened.bytes(), prefix.as_slice());
    }

    {
        let trx = db.create_trx()?;
        assert!(directory.remove(&trx, path(&["a"])).await?);
        trx.commit().await?;
    }

    {
        let trx = db.create_trx()?;
        assert!(!directory.exists(&trx, path(&["a", "c"])).await?);
        assert!(directory.list(&trx, vec![]).await?.is_empty());
        assert!(matches!(
            directory.open(&trx, path(&["a", "c"]), None).await,
            Err(DirectoryError::DirectoryDoesNotExists)
        ));
    }

    Ok(())
}

#[test]
fn test_create_list_move_remove() {
    block_on(test_create_list_move_remove_async()).expect("failed to run");
}

async fn test_directory_errors_async() -> Result<(), DirectoryError> {
    let db = common::database();
    let directory = DirectoryLayer::default();

    let trx = db.create_trx()?;
    directory.create(&trx, path(&["dup"]), None, None).await?;

    assert!(matches!(
        directory.create(&trx, path(&["dup"]), None, None).await,
        Err(DirectoryError::DirAlreadyExists)
    ));
    assert!(matches!(
        directory.open(&trx, path(&["missing"]), None).await,
        Err(DirectoryError::DirectoryDoesNotExists)
    ));
    assert!(matches!(
        directory.create_or_open(&trx, vec![], None, None).await,
        Err(DirectoryError::NoPathProvided)
    ));
    assert!(matches!(
        directory.remove(&trx, vec![]).await,
        Err(DirectoryError::CannotModifyRootDirectory)
    ));
    assert!(matches!(
        directory.remove(&trx, path(&["missing"])).await,
        Err(DirectoryError::DirectoryDoesNotExists)
    ));
    assert!(!directory.remove_if_exists(&trx, path(&["missing"])).await?);

    // moves
    directory.create(&trx, path(&["other"]), None, None).await?;
    assert!(matches!(
        directory
            .move_to(&trx, path(&["dup"]), path(&["other"]))
            .await,
        Err(DirectoryError::DirAlreadyExists)
    ));
    assert!(matches!(
        directory
            .move_to(&trx, path(&["dup"]), path(&["dup", "sub"]))
            .await,
        Err(DirectoryError::CannotMoveBetweenSubdirectory)
    ));
    assert!(matches!(
        directory
            .move_to(&trx, path(&["dup"]), path(&["nope", "sub"]))
            .await,
        Err(DirectoryError::ParentDirDoesNotExists)
    ));

    Ok(())
}

#[test]
fn test_directory_errors() {
    block_on(test_directory_errors_async()).expect("failed to run");
}

async fn test_directory_layers_async() -> Result<(), DirectoryError> {
    let db = common::database();
    let directory = DirectoryLayer::default();

    let trx = db.create_trx()?;
    let created = directory
        .create(&trx, path(&["queue"]), None, Some(b"queue".to_vec()))
        .await?;
    assert_eq!(created.get_layer(), b"queue".to_vec());
    trx.commit().await?;

    let trx = db.create_trx()?;
    assert!(directory
        .open(&trx, path(&["queue"]), Some(b"queue".to_vec()))
        .await
        .is_ok());
    assert!(directory.open(&trx, path(&["queue"]), None).await.is_ok());
    assert!(matches!(
        directory
            .open(&trx, path(&["queue"]), Some(b"stack".to_vec()))
            .await,
        Err(DirectoryError::IncompatibleLayer)
    ));

    Ok(())
}

#[test]
fn test_directory_layers() {
    block_on(test_directory_layers_async()).expect("failed to run");
}

async fn test_directory_subspace_facade_async() -> Result<(), DirectoryError> {
    let db = common::database();
    let directory = DirectoryLayer::default();

    let trx = db.create_trx()?;
    let app = directory.create(&trx, path(&["app"]), None, None).await?;
    let sub = app.create(&trx, path(&["sub"]), None, None).await?;

    assert_eq!(sub.get_path(), path(&["app", "sub"]));
    assert!(directory.exists(&trx, path(&["app", "sub"])).await?);
    assert_eq!(app.list(&trx, vec![]).await?, path(&["sub"]));

    // subspace keys of the child live under the parent directory's region
    // of keyspace only through its own allocated prefix
    assert!(sub.bytes() != app.bytes());

    trx.commit().await?;
    Ok(())
}

#[test]
fn test_directory_subspace_facade() {
    block_on(test_directory_subspace_facade_async()).expect("failed to run");
}

async fn test_directory_partition_async() -> Result<(), DirectoryError> {
    let db = common::database();
    let directory = DirectoryLayer::default();

    let trx = db.create_trx()?;
    let partition = directory
        .create(&trx, path(&["p"]), None, Some(b"partition".to_vec()))
        .await?;
    assert!(matches!(partition, DirectoryOutput::DirectoryPartition(_)));
    assert_eq!(partition.get_layer(), b"partition".to_vec());

    // operations on paths crossing into the partition are forwarded
    let x = directory
        .create(&trx, path(&["p", "x"]), None, None)
        .await?;
    assert_eq!(x.get_path(), path(&["p", "x"]));
    assert_eq!(directory.list(&trx, path(&["p"])).await?, path(&["x"]));
    assert!(directory.exists(&trx, path(&["p", "x"])).await?);

    // creating through the partition handle works the same way
    partition.create(&trx, path(&["y"]), None, None).await?;
    let mut names = directory.list(&trx, path(&["p"])).await?;
    names.sort();
    assert_eq!(names, path(&["x", "y"]));

    // moves within one partition are allowed
    directory
        .move_to(&trx, path(&["p", "x"]), path(&["p", "z"]))
        .await?;
    assert!(directory.exists(&trx, path(&["p", "z"])).await?);

    // moves across partition boundaries are not
    directory
        .create(&trx, path(&["q"]), None, Some(b"partition".to_vec()))
        .await?;
    assert!(matches!(
        directory
            .move_to(&trx, path(&["p", "z"]), path(&["q", "z"]))
            .await,
        Err(DirectoryError::CannotMoveBetweenPartition)
    ));
    assert!(matches!(
        directory
            .move_to(&trx, path(&["p", "z"]), path(&["elsewhere"]))
            .await,
        Err(DirectoryError::CannotMoveBetweenPartition)
    ));

    // removing the partition removes everything inside it
    assert!(directory.remove(&trx, path(&["p"])).await?);
    assert!(!directory.exists(&trx, path(&["p"])).await?);

    trx.commit().await?;
    Ok(())
}

#[test]
fn test_directory_partition() {
    block_on(test_directory_partition_async()).expect("failed to run");
}

async fn test_manual_prefixes_async() -> Result<(), DirectoryError> {
    let db = common::database();

    // manual prefixes are rejected unless enabled
    let restricted = DirectoryLayer::default();
    {
        let trx = db.create_trx()?;
        assert!(matches!(
            restricted
                .create(&trx, path(&["m"]), Some(b"\x02custom".to_vec()), None)
                .await,
            Err(DirectoryError::PrefixNotAllowed)
        ));
    }

    let directory = DirectoryLayer::new(
        Subspace::from_bytes(b"\xFE"),
        Subspace::all(),
        true,
    );

    let trx = db.create_trx()?;
    let created = directory
        .create(&trx, path(&["m"]), Some(b"\x02custom".to_vec()), None)
        .await?;
    assert_eq!(created.bytes(), b"\x02custom");

    // the same prefix cannot be claimed twice, nor can one nested inside it
    assert!(matches!(
        directory
            .create(&trx, path(&["m2"]), Some(b"\x02custom".to_vec()), None)
            .await,
        Err(DirectoryError::DirectoryPrefixInUse)
    ));
    assert!(matches!(
        directory
            .create(&trx, path(&["m3"]), Some(b"\x02custom\x01".to_vec()), None)
            .await,
        Err(DirectoryError::DirectoryPrefixInUse)
    ));

    trx.commit().await?;
    Ok(())
}

#[test]
fn test_manual_prefixes() {
    block_on(test_manual_prefixes_async()).expect("failed to run");
}

async fn test_version_gating_async() -> Result<(), DirectoryError> {
    let version_suffix: &[u8] = b"version";

    // a directory stamped with a future major version cannot be loaded
    {
        let db = common::database();
        let trx = db.create_trx()?;
        let node_subspace = Subspace::from_bytes(b"\xFE");
        let root_node = node_subspace.subspace(&node_subspace.bytes());

        let mut value = vec![];
        value.write_u32::<LittleEndian>(2).unwrap();
        value.write_u32::<LittleEndian>(0).unwrap();
        value.write_u32::<LittleEndian>(0).unwrap();
        trx.set(root_node.subspace(&version_suffix).bytes(), &value);
        trx.commit().await?;

        let directory = DirectoryLayer::default();
        let trx = db.create_trx()?;
        assert!(matches!(
            directory.list(&trx, vec![]).await,
            Err(DirectoryError::Version(_))
        ));
    }

    // a future minor version is readable but not writable
    {
        let db = common::database();
        let trx = db.create_trx()?;
        let node_subspace = Subspace::from_bytes(b"\xFE");
        let root_node = node_subspace.subspace(&node_subspace.bytes());

        let mut value = vec![];
        value.write_u32::<LittleEndian>(1).unwrap();
        value.write_u32::<LittleEndian>(1).unwrap();
        value.write_u32::<LittleEndian>(0).unwrap();
        trx.set(root_node.subspace(&version_suffix).bytes(), &value);
        trx.commit().await?;

        let directory = DirectoryLayer::default();
        let trx = db.create_trx()?;
        assert!(directory.list(&trx, vec![]).await.is_ok());
        assert!(matches!(
            directory.create(&trx, path(&["nope"]), None, None).await,
            Err(DirectoryError::Version(_))
        ));
    }

    Ok(())
}

#[test]
fn test_version_gating() {
    block_on(test_version_gating_async()).expect("failed to run");
}

async fn test_remove_wipes_content_async() -> Result<(), DirectoryError> {
    let db = common::database();
    let directory = DirectoryLayer::default();

    let key = {
        let trx = db.create_trx()?;
        let dir = directory.create(&trx, path(&["data"]), None, None).await?;
        let key = dir.pack(&("row", 1));
        trx.set(&key, b"value");
        trx.commit().await?;
        key
    };

    {
        let trx = db.create_trx()?;
        assert!(trx.get(&key, false).await?.is_some());
        assert!(directory.remove(&trx, path(&["data"])).await?);
        trx.commit().await?;
    }

    let trx = db.create_trx()?;
    assert!(trx.get(&key, false).await?.is_none());

    Ok(())
}

#[test]
fn test_remove_wipes_content() {
    block_on(test_remove_wipes_content_async()).expect("failed to run");
}
