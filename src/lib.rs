// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Layered data structures over an ordered, transactional key-value store.
//!
//! The crate ships an in-process store engine (`Database`/`Transaction`)
//! with optimistic concurrency control, an order-preserving tuple codec
//! with subspace management, and a family of reusable layers built on top:
//!
//! - [`rankedset::RankedSet`] — an ordered set with O(log n) rank queries;
//! - [`scoredset::ScoredSet`] — a sorted set of items with integer scores;
//! - [`priorityqueue::PriorityQueue`] — a double-ended priority queue with
//!   a high-contention pop protocol;
//! - [`stringintern::StringIntern`] — write-once string interning with a
//!   bounded cache;
//! - [`directory`] — a hierarchical, path-addressed prefix allocator with
//!   partitions, backed by [`tuple::hca::HighContentionAllocator`].
//!
//! Every layer operation is a transactional function taking a
//! [`Transaction`]; `Database::transact_boxed` provides the retry loop.

pub mod directory;
pub mod error;
pub mod options;
pub mod priorityqueue;
pub mod rankedset;
pub mod scoredset;
pub mod stringintern;
pub mod tuple;

mod database;
mod keyselector;
mod store;
mod transaction;

pub use crate::database::{Database, TransactError, TransactOption};
pub use crate::error::{FdbError, FdbResult};
pub use crate::keyselector::KeySelector;
pub use crate::transaction::{FdbSlice, KeyValue, KeyValues, RangeOption, Transaction};
