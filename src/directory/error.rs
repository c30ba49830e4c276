// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Errors that can be thrown by Directory.

use crate::error::FdbError;
use crate::tuple::hca::HcaError;
use crate::tuple::PackError;
use crate::TransactError;
use std::fmt;

/// The enumeration holding all possible errors from a Directory.
#[derive(Debug)]
pub enum DirectoryError {
    /// cannot modify the root directory
    CannotModifyRootDirectory,
    /// prefix is already used
    DirectoryPrefixInUse,
    /// the directory does not exist
    DirectoryDoesNotExists,
    /// missing path
    NoPathProvided,
    /// tried to create an already existing path
    DirAlreadyExists,
    /// missing directory
    PathDoesNotExists,
    /// parent does not exist
    ParentDirDoesNotExists,
    /// the layer is incompatible
    IncompatibleLayer,
    /// the destination directory cannot be a subdirectory of the source
    /// directory
    BadDestinationDirectory,
    /// bad directory version
    Version(String),
    /// cannot specify a prefix unless manual prefixes are enabled
    PrefixNotAllowed,
    /// cannot specify a prefix in a partition
    CannotPrefixInPartition,
    /// the root directory cannot be moved
    CannotMoveRootDirectory,
    /// a move may not cross partition boundaries
    CannotMoveBetweenPartition,
    /// the destination directory cannot be a subdirectory of the source
    /// directory
    CannotMoveBetweenSubdirectory,
    /// the auto-allocated prefix is not empty
    PrefixNotEmpty,
    FdbError(FdbError),
    HcaError(HcaError),
    PackError(PackError),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DirectoryError::CannotModifyRootDirectory => {
                write!(f, "the root directory may not be modified")
            }
            DirectoryError::DirectoryPrefixInUse => write!(f, "the given prefix is already in use"),
            DirectoryError::DirectoryDoesNotExists => write!(f, "the directory does not exist"),
            DirectoryError::NoPathProvided => write!(f, "the path may not be empty"),
            DirectoryError::DirAlreadyExists => write!(f, "the directory already exists"),
            DirectoryError::PathDoesNotExists => write!(f, "the path does not exist"),
            DirectoryError::ParentDirDoesNotExists => {
                write!(f, "the parent directory does not exist")
            }
            DirectoryError::IncompatibleLayer => write!(
                f,
                "the directory was created with an incompatible layer"
            ),
            DirectoryError::BadDestinationDirectory => write!(f, "bad destination directory"),
            DirectoryError::Version(msg) => write!(f, "{}", msg),
            DirectoryError::PrefixNotAllowed => write!(
                f,
                "cannot specify a prefix unless manual prefixes are enabled"
            ),
            DirectoryError::CannotPrefixInPartition => {
                write!(f, "cannot specify a prefix in a partition")
            }
            DirectoryError::CannotMoveRootDirectory => {
                write!(f, "the root directory cannot be moved")
            }
            DirectoryError::CannotMoveBetweenPartition => {
                write!(f, "cannot move between partitions")
            }
            DirectoryError::CannotMoveBetweenSubdirectory => write!(
                f,
                "the destination directory cannot be a subdirectory of the source directory"
            ),
            DirectoryError::PrefixNotEmpty => write!(f, "the allocated prefix is not empty"),
            DirectoryError::FdbError(err) => err.fmt(f),
            DirectoryError::HcaError(err) => err.fmt(f),
            DirectoryError::PackError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<FdbError> for DirectoryError {
    fn from(err: FdbError) -> Self {
        DirectoryError::FdbError(err)
    }
}

impl From<HcaError> for DirectoryError {
    fn from(err: HcaError) -> Self {
        DirectoryError::HcaError(err)
    }
}

impl From<PackError> for DirectoryError {
    fn from(err: PackError) -> Self {
        DirectoryError::PackError(err)
    }
}

impl TransactError for DirectoryError {
    fn try_into_fdb_error(self) -> Result<FdbError, Self> {
        match self {
            DirectoryError::FdbError(err) => Ok(err),
            DirectoryError::HcaError(HcaError::FdbError(err)) => Ok(err),
            other => Err(other),
        }
    }
}
