// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use futures::executor::block_on;

use layerdb::scoredset::{ScoredSet, ScoredSetError};
use layerdb::tuple::{Element, Subspace};
use layerdb::Database;

mod common;

fn item(name: &str) -> Element {
    Element::String(name.to_string())
}

async fn open_set(db: &Database) -> Result<ScoredSet, ScoredSetError> {
    let trx = db.create_trx()?;
    let ss = ScoredSet::new(&trx, Subspace::from_bytes(b"test-scoredset")).await?;
    trx.commit().await?;
    Ok(ss)
}

async fn test_scoredset_ordering_async() -> Result<(), ScoredSetError> {
    let db = common::database();
    let ss = open_set(&db).await?;

    let trx = db.create_trx()?;
    ss.insert(&trx, &item("a"), 10).await?;
    ss.insert(&trx, &item("b"), 8).await?;
    ss.insert(&trx, &item("c"), 8).await?;
    ss.insert(&trx, &item("d"), 6).await?;

    let by_rank = ss.get_range_by_rank(&trx, 0, 4).await?;
    assert_eq!(by_rank.len(), 4);
    assert_eq!(by_rank[0], item("d"));
    assert!(by_rank[1..3].contains(&item("b")));
    assert!(by_rank[1..3].contains(&item("c")));
    assert_eq!(by_rank[3], item("a"));

    assert_eq!(ss.get_max_score(&trx).await?, Some(10));
    assert_eq!(ss.get_max_rank(&trx).await?, Some(2));
    assert_eq!(ss.get_rank(&trx, &item("a")).await?, Some(2));
    assert_eq!(ss.get_rank(&trx, &item("d")).await?, Some(0));
    assert_eq!(ss.get_rank(&trx, &item("b")).await?, Some(1));
    assert_eq!(ss.get_rank(&trx, &item("missing")).await?, None);

    let mut eights = ss.get_items(&trx, 8).await?;
    eights.sort_by_key(|e| format!("{:?}", e));
    assert_eq!(eights, vec![item("b"), item("c")]);

    assert_eq!(ss.get_successors(&trx, &item("d")).await?.len(), 2);
    assert_eq!(ss.get_predecessors(&trx, &item("a")).await?.len(), 2);
    assert_eq!(ss.get_predecessors(&trx, &item("d")).await?, vec![]);
    assert_eq!(ss.get_successors(&trx, &item("a")).await?, vec![]);

    trx.commit().await?;
    Ok(())
}

#[test]
fn test_scoredset_ordering() {
    block_on(test_scoredset_ordering_async()).expect("failed to run");
}

async fn test_scoredset_updates_async() -> Result<(), ScoredSetError> {
    let db = common::database();
    let ss = open_set(&db).await?;

    let trx = db.create_trx()?;

    assert_eq!(ss.insert(&trx, &item("a"), 5).await?, None);
    assert_eq!(ss.insert(&trx, &item("a"), 7).await?, Some(5));
    assert_eq!(ss.get_score(&trx, &item("a")).await?, Some(7));

    // the old score is released from the ranking when unused
    assert_eq!(ss.get_rank_by_score(&trx, 5).await?, None);

    assert_eq!(ss.increment(&trx, &item("a"), 3).await?, 7);
    assert_eq!(ss.get_score(&trx, &item("a")).await?, Some(10));

    assert!(matches!(
        ss.increment(&trx, &item("nope"), 1).await,
        Err(ScoredSetError::ItemNotFound(_))
    ));

    assert_eq!(ss.delete(&trx, &item("a")).await?, Some(10));
    assert_eq!(ss.delete(&trx, &item("a")).await?, None);
    assert_eq!(ss.get_score(&trx, &item("a")).await?, None);

    trx.commit().await?;
    Ok(())
}

#[test]
fn test_scoredset_updates() {
    block_on(test_scoredset_updates_async()).expect("failed to run");
}

async fn test_scoredset_ranges_async() -> Result<(), ScoredSetError> {
    let db = common::database();
    let ss = open_set(&db).await?;

    let trx = db.create_trx()?;
    for (name, score) in [("a", -5i64), ("b", 0), ("c", 3), ("d", 3), ("e", 9)] {
        ss.insert(&trx, &item(name), score).await?;
    }

    // negative scores order below zero
    assert_eq!(ss.get_rank(&trx, &item("a")).await?, Some(0));

    let range = ss.get_range_by_score(&trx, 0, 4, false).await?;
    assert_eq!(range.len(), 3);
    assert_eq!(range[0], item("b"));

    let reversed = ss.get_range_by_score(&trx, 0, 4, true).await?;
    assert_eq!(reversed.len(), 3);
    assert_eq!(reversed[2], item("b"));

    assert_eq!(
        ss.count_by_score(&trx, 0, 4).await?,
        ss.get_range_by_score(&trx, 0, 4, false).await?.len()
    );
    assert_eq!(ss.count_by_score(&trx, i64::MIN, i64::MAX).await?, 5);

    // iterate yields every pair, in item order within the index
    let mut iter = ss.iterate(&trx);
    let mut seen = 0;
    while let Some((_, score)) = iter.next().await? {
        assert!((-5..=9).contains(&score));
        seen += 1;
    }
    assert_eq!(seen, 5);

    assert_eq!(ss.get_items_by_rank(&trx, 1).await?, vec![item("b")]);
    assert_eq!(ss.get_items_by_rank(&trx, 99).await?, vec![]);

    trx.commit().await?;
    Ok(())
}

#[test]
fn test_scoredset_ranges() {
    block_on(test_scoredset_ranges_async()).expect("failed to run");
}

async fn test_scoredset_deletion_async() -> Result<(), ScoredSetError> {
    let db = common::database();
    let ss = open_set(&db).await?;

    let trx = db.create_trx()?;
    for (name, score) in [("a", 1i64), ("b", 2), ("c", 2), ("d", 3), ("e", 8)] {
        ss.insert(&trx, &item(name), score).await?;
    }

    let mut erased = ss.delete_by_score(&trx, 2, 4).await?;
    erased.sort_unstable();
    assert_eq!(erased, vec![2, 3]);
    assert_eq!(ss.get_score(&trx, &item("b")).await?, None);
    assert_eq!(ss.get_score(&trx, &item("c")).await?, None);
    assert_eq!(ss.get_score(&trx, &item("d")).await?, None);
    assert_eq!(ss.count_by_score(&trx, i64::MIN, i64::MAX).await?, 2);

    // [0, 1) in rank space hits the lowest remaining score
    let erased = ss.delete_by_rank(&trx, 0, 1).await?;
    assert_eq!(erased, vec![1]);
    assert_eq!(ss.get_score(&trx, &item("a")).await?, None);
    assert_eq!(ss.get_score(&trx, &item("e")).await?, Some(8));

    assert!(matches!(
        ss.delete_by_rank(&trx, -1, 1).await,
        Err(ScoredSetError::NegativeRank)
    ));

    trx.commit().await?;
    Ok(())
}

#[test]
fn test_scoredset_deletion() {
    block_on(test_scoredset_deletion_async()).expect("failed to run");
}
