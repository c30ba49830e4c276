// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Options that can be applied to transactions and individual operations.

use std::time::Duration;

/// A set of atomic read-modify-write operations.
///
/// An atomic operation is equivalent to a write without a read for conflict
/// checking purposes: it can never cause the issuing transaction to conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationType {
    /// Little-endian signed integer addition of the 8-byte operand to the
    /// existing value (missing values are treated as zero).
    Add,
}

/// The type of conflict range added by `Transaction::add_conflict_range`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictRangeType {
    /// Pretend the range was read; the transaction will conflict with writes
    /// committed to the range by others.
    Read,
    /// Pretend the range was written; other transactions reading the range
    /// will conflict with this one.
    Write,
}

/// Per-transaction options.
#[derive(Clone, Debug)]
pub enum TransactionOption {
    /// Maximum number of retries `Database::transact` will attempt.
    RetryLimit(u32),
    /// Wall-clock budget after which operations fail with `timed_out`.
    Timeout(Duration),
    /// The next write performed on this transaction will not generate a
    /// write conflict range.
    NextWriteNoWriteConflictRange,
}
