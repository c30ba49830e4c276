// Copyright 2018 foundationdb-rs developers, https://github.com/bluejekyll/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error types for the store engine.
//!
//! Errors carry a numeric code in the classic key-value client style so that
//! layer code can test for specific conditions (notably `NOT_COMMITTED`) and
//! so that retry loops can consult the retryable predicates.

use std::fmt;

/// Error codes the engine can produce.
pub mod code {
    /// Transaction not committed due to a conflict with another transaction.
    pub const NOT_COMMITTED: i32 = 1020;
    /// Operation aborted because the transaction timed out.
    pub const TIMED_OUT: i32 = 1004;
    /// An operation was issued while a commit was outstanding.
    pub const USED_DURING_COMMIT: i32 = 2103;
    /// An invalid operation was issued by the client.
    pub const CLIENT_INVALID_OPERATION: i32 = 2000;
}

fn code_str(code: i32) -> &'static str {
    match code {
        code::NOT_COMMITTED => "Transaction not committed due to conflict with another transaction",
        code::TIMED_OUT => "Operation aborted because the transaction timed out",
        code::USED_DURING_COMMIT => "Operation issued while a commit was outstanding",
        code::CLIENT_INVALID_OPERATION => "Invalid API call",
        _ => "Unknown error",
    }
}

/// An error from the store with an associated code.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FdbError {
    error_code: i32,
}

/// A store Result type.
pub type FdbResult<T> = std::result::Result<T, FdbError>;

impl FdbError {
    /// Builds an error from the given code.
    pub fn from_code(error_code: i32) -> Self {
        FdbError { error_code }
    }

    /// Indicates the transaction may have succeeded, though not in a way the
    /// engine can verify. The in-process engine always knows the outcome of a
    /// commit, so no code currently carries this property.
    pub fn is_maybe_committed(&self) -> bool {
        false
    }

    /// Indicates the operations in the transaction should be retried because
    /// of a transient error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.error_code,
            code::NOT_COMMITTED | code::USED_DURING_COMMIT
        )
    }

    /// Indicates the transaction has not committed, though in a way that can
    /// be retried.
    pub fn is_retryable_not_committed(&self) -> bool {
        self.error_code == code::NOT_COMMITTED
    }

    /// Error code
    pub fn code(&self) -> i32 {
        self.error_code
    }
}

impl fmt::Debug for FdbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FdbError({})", self.error_code)
    }
}

impl fmt::Display for FdbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Error({}): {}",
            self.error_code,
            code_str(self.error_code)
        )
    }
}

impl std::error::Error for FdbError {}
