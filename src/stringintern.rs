// Copyright 2018 foundationdb-rs developers, https://github.com/Clikengo/foundationdb-rs/graphs/contributors
// Copyright 2013-2018 Apple, Inc and the FoundationDB project authors.
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! String interning: normalizing commonly-used long strings into shorter
//! unique identifiers.
//!
//! `intern` is non-transactional. It calls a transactional function
//! internally but performs all cache manipulation outside of the
//! transaction. Because the transaction alters the intern database, the
//! separation of cache manipulation from the transaction is necessary to
//! maintain cache validity in the event of a transaction failure.
//!
//! `lookup` is transactional and performs its cache manipulation inside the
//! transaction. This is possible only because 1) the transaction only reads
//! the intern database, and 2) the keys in the intern database are
//! write-once, so the string <-> identifier relation grows monotonically.
//! No other transaction can alter the intern database in a way that
//! invalidates previous reads, so any data read by `lookup` is correct even
//! if the transaction fails.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use rand::{Rng, RngCore};

use crate::error::FdbError;
use crate::tuple::{PackError, Subspace};
use crate::{Database, TransactError, Transaction};

/// Upper bound for cache accounting, in bytes. This is the declared constant
/// of ten million bytes (not 10 MiB).
pub const CACHE_LIMIT_BYTES: usize = 10_000_000;

/// Errors from intern operations.
#[derive(Debug)]
pub enum InternError {
    /// The identifier is not present in the intern database.
    UidNotFound,
    /// An interned value was not valid UTF-8.
    BadStoredString,
    /// Eviction was requested from an empty cache.
    EmptyCacheEviction,
    FdbError(FdbError),
    PackError(PackError),
}

impl fmt::Display for InternError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InternError::UidNotFound => write!(f, "string intern identifier not found"),
            InternError::BadStoredString => write!(f, "interned string is not valid UTF-8"),
            InternError::EmptyCacheEviction => write!(f, "cannot evict from empty cache"),
            InternError::FdbError(err) => err.fmt(f),
            InternError::PackError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for InternError {}

impl From<FdbError> for InternError {
    fn from(err: FdbError) -> Self {
        InternError::FdbError(err)
    }
}

impl From<PackError> for InternError {
    fn from(err: PackError) -> Self {
        InternError::PackError(err)
    }
}

impl TransactError for InternError {
    fn try_into_fdb_error(self) -> Result<FdbError, Self> {
        match self {
            InternError::FdbError(err) => Ok(err),
            other => Err(other),
        }
    }
}

#[derive(Default)]
struct Cache {
    uids: Vec<Vec<u8>>,
    uid_to_string: HashMap<Vec<u8>, String>,
    string_to_uid: HashMap<String, Vec<u8>>,
    bytes_cached: usize,
}

impl Cache {
    fn insert(&mut self, s: &str, uid: &[u8]) {
        if !self.uid_to_string.contains_key(uid) {
            self.string_to_uid.insert(s.to_string(), uid.to_vec());
            self.uid_to_string.insert(uid.to_vec(), s.to_string());
            self.uids.push(uid.to_vec());
            self.bytes_cached += (s.len() + uid.len()) * 2;
        }
    }

    // Uniformly random eviction by swap-pop.
    fn evict(&mut self) -> Result<(), InternError> {
        if self.uids.is_empty() {
            return Err(InternError::EmptyCacheEviction);
        }
        let i = rand::thread_rng().gen_range(0..self.uids.len());
        let uid = self.uids.swap_remove(i);

        let s = match self.uid_to_string.remove(&uid) {
            Some(s) => s,
            None => return Err(InternError::UidNotFound),
        };
        self.string_to_uid.remove(&s);
        self.bytes_cached -= (s.len() + uid.len()) * 2;
        Ok(())
    }
}

/// Interns strings into short, unique identifiers, with a bounded in-process
/// cache of the mapping in both directions.
pub struct StringIntern {
    string: Subspace,
    uid: Subspace,
    cache: Mutex<Cache>,
}

impl StringIntern {
    /// Creates an interner storing its state under `subspace`.
    pub fn new(subspace: Subspace) -> StringIntern {
        StringIntern {
            string: subspace.subspace(&"S"),
            uid: subspace.subspace(&"U"),
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Returns the normalized representation of `s`, interning it if it has
    /// not been seen before.
    pub async fn intern(&self, db: &Database, s: &str) -> Result<Vec<u8>, InternError> {
        if let Some(uid) = self.cache.lock().string_to_uid.get(s) {
            return Ok(uid.clone());
        }

        let uid = loop {
            let trx = db.create_trx()?;
            match self.intern_in_db(&trx, s).await {
                Ok(uid) => match trx.commit().await {
                    Ok(()) => break uid,
                    Err(e) if e.is_retryable() => continue,
                    Err(e) => return Err(e.into()),
                },
                Err(InternError::FdbError(e)) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        };

        // The cache is only updated once the transaction has committed.
        self.add_to_cache(s, &uid)?;
        Ok(uid)
    }

    /// Returns the reference string for the normalized representation `uid`.
    pub async fn lookup(&self, trx: &Transaction, uid: &[u8]) -> Result<String, InternError> {
        if let Some(s) = self.cache.lock().uid_to_string.get(uid) {
            return Ok(s.clone());
        }

        let value = match trx.get(&self.uid.pack(&uid.to_vec()), true).await? {
            None => return Err(InternError::UidNotFound),
            Some(value) => value,
        };
        let s = String::from_utf8(value).map_err(|_| InternError::BadStoredString)?;

        // Updating the cache inside the transaction is safe only because the
        // intern mapping is write-once: what was read stays true even if
        // this transaction never commits.
        self.add_to_cache(&s, uid)?;
        Ok(s)
    }

    async fn intern_in_db(&self, trx: &Transaction, s: &str) -> Result<Vec<u8>, InternError> {
        if let Some(uid) = trx.get(&self.string.pack(&s), false).await? {
            return Ok(uid);
        }
        let new_uid = self.find_uid(trx).await?;
        trx.set(&self.uid.pack(&new_uid), s.as_bytes());
        trx.set(&self.string.pack(&s), &new_uid);
        Ok(new_uid)
    }

    // Candidate identifiers gain a byte of entropy per collision, so this
    // terminates with overwhelming probability.
    async fn find_uid(&self, trx: &Transaction) -> Result<Vec<u8>, InternError> {
        let mut tries = 0;
        loop {
            let mut uid = vec![0u8; 4 + tries];
            rand::thread_rng().fill_bytes(&mut uid);
            if self.cache.lock().uid_to_string.contains_key(&uid) {
                continue;
            }
            if trx.get(&self.uid.pack(&uid), false).await?.is_none() {
                return Ok(uid);
            }
            tries += 1;
        }
    }

    fn add_to_cache(&self, s: &str, uid: &[u8]) -> Result<(), InternError> {
        let mut cache = self.cache.lock();
        while cache.bytes_cached > CACHE_LIMIT_BYTES {
            cache.evict()?;
        }
        cache.insert(s, uid);
        Ok(())
    }
}
