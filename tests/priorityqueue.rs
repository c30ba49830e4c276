// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::HashSet;

use futures::executor::block_on;

use layerdb::priorityqueue::{PriorityQueue, QueueError};
use layerdb::tuple::{Element, Subspace};
use layerdb::Database;

mod common;

fn queue(high_contention: bool) -> PriorityQueue {
    PriorityQueue::new(Subspace::from_bytes(b"test-pq"), high_contention)
}

async fn push_one(
    db: &Database,
    pq: &PriorityQueue,
    item: &Element,
    priority: i64,
) -> Result<(), QueueError> {
    loop {
        let trx = db.create_trx()?;
        match pq.push(&trx, item, priority).await {
            Ok(()) => match trx.commit().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e.into()),
            },
            Err(QueueError::FdbError(e)) if e.is_retryable() => continue,
            Err(e) => return Err(e),
        }
    }
}

async fn test_low_contention_ordering_async() -> Result<(), QueueError> {
    let db = common::database();
    let pq = queue(false);

    {
        let trx = db.create_trx()?;
        assert!(pq.is_empty(&trx).await?);
    }

    push_one(&db, &pq, &Element::Int(10), 10).await?;
    push_one(&db, &pq, &Element::Int(8), 8).await?;
    push_one(&db, &pq, &Element::Int(7), 8).await?;
    push_one(&db, &pq, &Element::Int(6), 6).await?;

    {
        let trx = db.create_trx()?;
        assert!(!pq.is_empty(&trx).await?);
        assert_eq!(pq.peek(&trx, false).await?, Some(Element::Int(6)));
    }

    // pops come out in priority order, the two priority-8 items adjacent
    assert_eq!(pq.pop(&db, false).await?, Some(Element::Int(6)));
    let second = pq.pop(&db, false).await?.expect("a second item");
    let third = pq.pop(&db, false).await?.expect("a third item");
    let mut eights: Vec<Element> = vec![second, third];
    eights.sort_by_key(|e| format!("{:?}", e));
    assert_eq!(eights, vec![Element::Int(7), Element::Int(8)]);
    assert_eq!(pq.pop(&db, false).await?, Some(Element::Int(10)));
    assert_eq!(pq.pop(&db, false).await?, None);

    let trx = db.create_trx()?;
    assert!(pq.is_empty(&trx).await?);

    Ok(())
}

#[test]
fn test_low_contention_ordering() {
    block_on(test_low_contention_ordering_async()).expect("failed to run");
}

async fn test_pop_max_async() -> Result<(), QueueError> {
    let db = common::database();
    let pq = queue(false);

    for n in [3i64, 1, 2] {
        push_one(&db, &pq, &Element::Int(n), n).await?;
    }

    assert_eq!(pq.pop(&db, true).await?, Some(Element::Int(3)));
    assert_eq!(pq.pop(&db, true).await?, Some(Element::Int(2)));
    assert_eq!(pq.pop(&db, true).await?, Some(Element::Int(1)));
    assert_eq!(pq.pop(&db, true).await?, None);

    Ok(())
}

#[test]
fn test_pop_max() {
    block_on(test_pop_max_async()).expect("failed to run");
}

async fn test_remove_and_contains_async() -> Result<(), QueueError> {
    let db = common::database();
    let pq = queue(false);

    push_one(&db, &pq, &Element::String("x".to_string()), 1).await?;
    push_one(&db, &pq, &Element::String("y".to_string()), 2).await?;

    let x = Element::String("x".to_string());
    {
        let trx = db.create_trx()?;
        assert!(pq.contains(&trx, &x).await?);
        pq.remove(&trx, &x).await?;
        trx.commit().await?;
    }

    {
        let trx = db.create_trx()?;
        assert!(!pq.contains(&trx, &x).await?);
    }

    assert_eq!(
        pq.pop(&db, false).await?,
        Some(Element::String("y".to_string()))
    );
    assert_eq!(pq.pop(&db, false).await?, None);

    Ok(())
}

#[test]
fn test_remove_and_contains() {
    block_on(test_remove_and_contains_async()).expect("failed to run");
}

async fn test_clear_async() -> Result<(), QueueError> {
    let db = common::database();
    let pq = queue(false);

    push_one(&db, &pq, &Element::Int(5), 5).await?;

    let trx = db.create_trx()?;
    pq.clear(&trx);
    assert!(pq.is_empty(&trx).await?);
    trx.commit().await?;

    Ok(())
}

#[test]
fn test_clear() {
    block_on(test_clear_async()).expect("failed to run");
}

// Many producers and consumers running against the high-contention queue:
// every pushed item is popped exactly once across all clients, with no
// duplicates and no losses.
#[test]
fn test_high_contention_pop() {
    const CLIENTS: usize = 4;
    const PER_CLIENT: usize = 25;

    let db = common::database();
    let pq = queue(true);

    let producers: Vec<_> = (0..CLIENTS)
        .map(|id| {
            let db = db.clone();
            let pq = pq.clone();
            std::thread::spawn(move || {
                block_on(async {
                    for i in 0..PER_CLIENT {
                        let item = Element::String(format!("{}.{}", id, i));
                        push_one(&db, &pq, &item, id as i64).await.unwrap();
                    }
                })
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CLIENTS)
        .map(|_| {
            let db = db.clone();
            let pq = pq.clone();
            std::thread::spawn(move || {
                block_on(async {
                    let mut popped = Vec::new();
                    for _ in 0..PER_CLIENT {
                        if let Some(item) = pq.pop(&db, false).await.unwrap() {
                            popped.push(item);
                        }
                    }
                    popped
                })
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("failed to join producer");
    }
    let mut popped: Vec<Element> = Vec::new();
    for consumer in consumers {
        popped.extend(consumer.join().expect("failed to join consumer"));
    }

    // Drain what the consumers left behind.
    let drain = queue(false);
    block_on(async {
        while let Some(item) = drain.pop(&db, false).await.unwrap() {
            popped.push(item);
        }
    });

    assert_eq!(popped.len(), CLIENTS * PER_CLIENT, "no losses");

    let unique: HashSet<String> = popped
        .iter()
        .map(|e| match e {
            Element::String(s) => s.clone(),
            other => panic!("unexpected item {:?}", other),
        })
        .collect();
    assert_eq!(unique.len(), CLIENTS * PER_CLIENT, "no duplicates");
}
