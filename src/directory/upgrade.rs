// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Upgrades a directory hierarchy created before versioning to version 1.0.0.
//!
//! The original directory layout allowed byte-string path components and
//! carried no version key. The upgrade walks the node tree breadth-first in
//! bounded transactional batches, coercing byte-string child names to UTF-8
//! and renaming the corresponding subdirectory entries, then stamps the
//! version key. The walk runs twice: a dry-run pass that collects every
//! problem it finds, then an apply pass that fails on the first problem.

use std::collections::VecDeque;
use std::fmt;

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};

use crate::directory::directory_layer::{DirectoryLayer, DEFAULT_SUB_DIRS, VERSION_SUFFIX};
use crate::error::FdbError;
use crate::tuple::{Element, PackError, Subspace};
use crate::{Database, RangeOption, Transaction};

const VERSION: (u32, u32, u32) = (1, 0, 0);

/// How many nodes are processed per transaction.
const BATCH: usize = 100;

/// The result of a successful `upgrade` call.
#[derive(Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The directory was upgraded and stamped with the current version.
    Upgraded,
    /// The directory already carries the current version; nothing was done.
    /// Pass `force` to re-run the upgrade anyway.
    AlreadyCurrent,
}

/// Errors from the directory upgrade.
#[derive(Debug)]
pub enum UpgradeError {
    /// The root node holds neither a version key nor any directory data.
    NoDirectoryPresent,
    /// A path contains elements other than byte strings and UTF-8 strings.
    InvalidPath(String),
    /// A renamed path collides with an existing directory.
    DestinationExists { path: String, destination: String },
    /// The dry-run pass found problems; nothing was modified.
    ValidationFailed(Vec<String>),
    FdbError(FdbError),
    PackError(PackError),
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UpgradeError::NoDirectoryPresent => write!(f, "no directory present"),
            UpgradeError::InvalidPath(path) => write!(
                f,
                "the path {} contains types other than byte and unicode strings",
                path
            ),
            UpgradeError::DestinationExists { path, destination } => write!(
                f,
                "the path {} cannot be upgraded because its destination {} already exists",
                path, destination
            ),
            UpgradeError::ValidationFailed(problems) => {
                write!(f, "validation found {} problem(s):", problems.len())?;
                for problem in problems {
                    write!(f, "\n  {}", problem)?;
                }
                Ok(())
            }
            UpgradeError::FdbError(err) => err.fmt(f),
            UpgradeError::PackError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for UpgradeError {}

impl From<FdbError> for UpgradeError {
    fn from(err: FdbError) -> Self {
        UpgradeError::FdbError(err)
    }
}

impl From<PackError> for UpgradeError {
    fn from(err: PackError) -> Self {
        UpgradeError::PackError(err)
    }
}

struct NodeInfo {
    node: Subspace,
    parent: Option<Subspace>,
    path: Vec<Element>,
}

fn format_path(path: &[Element]) -> String {
    format!("{:?}", path)
}

fn coerce_path(path: &[Element]) -> Result<Vec<String>, UpgradeError> {
    let mut out = Vec::with_capacity(path.len());
    for element in path {
        match element {
            Element::String(s) => out.push(s.clone()),
            Element::Bytes(b) => match String::from_utf8(b.clone()) {
                Ok(s) => out.push(s),
                Err(_) => return Err(UpgradeError::InvalidPath(format_path(path))),
            },
            _ => return Err(UpgradeError::InvalidPath(format_path(path))),
        }
    }
    Ok(out)
}

/// Upgrades the directory hierarchy owned by `directory` to version 1.0.0.
///
/// The upgrade is idempotent on an already-upgraded directory unless `force`
/// is set.
pub async fn upgrade(
    db: &Database,
    directory: &DirectoryLayer,
    force: bool,
) -> Result<UpgradeOutcome, UpgradeError> {
    let version = {
        let trx = db.create_trx()?;
        get_version(&trx, directory).await?
    };

    if version != (0, 0, 0) && !force {
        info!("directory is already at version {:?}", version);
        return Ok(UpgradeOutcome::AlreadyCurrent);
    }

    info!("validating that existing directories can be upgraded");
    let problems = run_pass(db, directory, true).await?;
    if !problems.is_empty() {
        return Err(UpgradeError::ValidationFailed(problems));
    }

    info!("upgrading directories");
    run_pass(db, directory, false).await?;

    info!("setting directory version to {:?}", VERSION);
    set_version(db, directory).await?;

    Ok(UpgradeOutcome::Upgraded)
}

async fn get_version(
    trx: &Transaction,
    directory: &DirectoryLayer,
) -> Result<(u32, u32, u32), UpgradeError> {
    let version_key = directory.root_node.subspace(&VERSION_SUFFIX);
    match trx.get(version_key.bytes(), false).await? {
        Some(value) => {
            if value.len() < 12 {
                return Err(UpgradeError::PackError(PackError::MissingBytes));
            }
            let mut arr = [0u8; 4];
            arr.copy_from_slice(&value[0..4]);
            let major = u32::from_le_bytes(arr);
            arr.copy_from_slice(&value[4..8]);
            let minor = u32::from_le_bytes(arr);
            arr.copy_from_slice(&value[8..12]);
            let patch = u32::from_le_bytes(arr);
            Ok((major, minor, patch))
        }
        None => {
            // No version key: either a pre-versioning directory or no
            // directory at all.
            let mut range_option = RangeOption::from(&directory.root_node);
            range_option.limit = Some(1);
            if trx.get_range(&range_option, false).await?.is_empty() {
                Err(UpgradeError::NoDirectoryPresent)
            } else {
                Ok((0, 0, 0))
            }
        }
    }
}

async fn set_version(db: &Database, directory: &DirectoryLayer) -> Result<(), UpgradeError> {
    loop {
        let trx = db.create_trx()?;
        let mut value = vec![];
        value.write_u32::<LittleEndian>(VERSION.0).unwrap();
        value.write_u32::<LittleEndian>(VERSION.1).unwrap();
        value.write_u32::<LittleEndian>(VERSION.2).unwrap();
        let version_key = directory.root_node.subspace(&VERSION_SUFFIX);
        trx.set(version_key.bytes(), &value);
        match trx.commit().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

async fn run_pass(
    db: &Database,
    directory: &DirectoryLayer,
    dry_run: bool,
) -> Result<Vec<String>, UpgradeError> {
    let mut queue: VecDeque<NodeInfo> = VecDeque::new();
    queue.push_back(NodeInfo {
        node: directory.root_node.clone(),
        parent: None,
        path: vec![],
    });

    let mut problems = Vec::new();

    while !queue.is_empty() {
        // one bounded batch per transaction, retried as a unit
        loop {
            let trx = db.create_trx()?;
            match process_batch(&trx, directory, &queue, dry_run).await {
                Ok((consumed, children, mut batch_problems)) => match trx.commit().await {
                    Ok(()) => {
                        for _ in 0..consumed {
                            queue.pop_front();
                        }
                        queue.extend(children);
                        problems.append(&mut batch_problems);
                        break;
                    }
                    Err(e) if e.is_retryable() => continue,
                    Err(e) => return Err(e.into()),
                },
                Err(UpgradeError::FdbError(e)) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    Ok(problems)
}

async fn process_batch(
    trx: &Transaction,
    directory: &DirectoryLayer,
    queue: &VecDeque<NodeInfo>,
    dry_run: bool,
) -> Result<(usize, Vec<NodeInfo>, Vec<String>), UpgradeError> {
    let mut children = Vec::new();
    let mut problems = Vec::new();
    let mut consumed = 0;

    for node_info in queue.iter().take(BATCH) {
        consumed += 1;
        match upgrade_v0_node(trx, node_info, dry_run).await {
            Ok(()) => {
                // children are only walked once their parent is upgradable
                children.extend(subdirs_of(trx, directory, node_info).await?);
            }
            Err(err @ (UpgradeError::FdbError(_) | UpgradeError::PackError(_))) => {
                return Err(err);
            }
            Err(err) => {
                if dry_run {
                    debug!("validation problem: {}", err);
                    problems.push(err.to_string());
                } else {
                    return Err(err);
                }
            }
        }
    }

    Ok((consumed, children, problems))
}

async fn subdirs_of(
    trx: &Transaction,
    directory: &DirectoryLayer,
    node_info: &NodeInfo,
) -> Result<Vec<NodeInfo>, UpgradeError> {
    let sub_dirs = node_info.node.subspace(&DEFAULT_SUB_DIRS);
    let rows = trx.get_range(&RangeOption::from(&sub_dirs), false).await?;

    let mut children = Vec::with_capacity(rows.len());
    for row in &rows {
        let (_, name): (i64, Element) = node_info.node.unpack(row.key())?;
        let mut path = node_info.path.clone();
        path.push(name);
        children.push(NodeInfo {
            node: directory.node_with_prefix(&row.value().to_vec()),
            parent: Some(node_info.node.clone()),
            path,
        });
    }
    Ok(children)
}

async fn upgrade_v0_node(
    trx: &Transaction,
    node_info: &NodeInfo,
    dry_run: bool,
) -> Result<(), UpgradeError> {
    let unicode_path = coerce_path(&node_info.path)?;

    let parent = match &node_info.parent {
        Some(parent) => parent,
        None => return Ok(()),
    };

    // Only a byte-string name needs renaming; its packed key differs from
    // the UTF-8 form of the same name.
    if matches!(node_info.path.last(), Some(Element::String(_))) {
        return Ok(());
    }

    // Verify that we aren't overwriting an existing directory.
    let new_name = unicode_path.last().unwrap();
    let new_key = parent.pack(&(DEFAULT_SUB_DIRS, new_name));
    if trx.get(&new_key, false).await?.is_some() {
        return Err(UpgradeError::DestinationExists {
            path: format_path(&node_info.path),
            destination: format!("{:?}", unicode_path),
        });
    }

    if !dry_run {
        let old_name = node_info.path.last().unwrap();
        let old_key = parent.pack(&(DEFAULT_SUB_DIRS, old_name));
        if let Some(prefix) = trx.get(&old_key, false).await? {
            trx.clear(&old_key);
            trx.set(&new_key, &prefix);
            debug!("renamed {:?} to {:?}", node_info.path, unicode_path);
        }
    }

    Ok(())
}
