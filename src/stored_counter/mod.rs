// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A monotonic counter persisted in a [`SettingsStore`], used to hand out
//! sector numbers.
//!
//! The stored value is the last number handed out, encoded as an unsigned
//! varint. An absent record means nothing was handed out yet, so the first
//! [`StoredCounter::next`] returns `0`.

use std::sync::Arc;

use integer_encoding::VarInt as _;
use parking_lot::Mutex;
use thiserror::Error;

use crate::db::SettingsStore;

#[derive(Debug, Error)]
pub enum Error {
    #[error("counter value {target} must not be less than the current value {current}")]
    InvalidDecrease { target: u64, current: u64 },
    #[error("counter record under {key} is not a valid varint")]
    Corrupted { key: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Counter that persists to a [`SettingsStore`] as it increments.
///
/// All operations hold the same lock for their whole read-modify-write, so two
/// concurrent [`StoredCounter::next`] calls never observe the same value.
pub struct StoredCounter<DB> {
    lock: Mutex<()>,
    db: Arc<DB>,
    key: String,
}

impl<DB: SettingsStore> StoredCounter<DB> {
    pub fn new(db: Arc<DB>, key: impl Into<String>) -> Self {
        Self {
            lock: Mutex::new(()),
            db,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the next counter value, persisting it before returning.
    pub fn next(&self) -> Result<u64, Error> {
        let _guard = self.lock.lock();
        let next = match self.load()? {
            Some(current) => current
                .checked_add(1)
                .ok_or_else(|| anyhow::anyhow!("counter {} overflowed", self.key))?,
            None => 0,
        };
        self.store(next)?;
        Ok(next)
    }

    /// Returns the last persisted value, or `0` if nothing was persisted yet.
    pub fn get(&self) -> Result<u64, Error> {
        let _guard = self.lock.lock();
        Ok(self.load()?.unwrap_or_default())
    }

    /// Fast-forwards the counter to `target`. Fails if that would rewind it.
    pub fn set(&self, target: u64) -> Result<(), Error> {
        let _guard = self.lock.lock();
        if let Some(current) = self.load()?
            && current > target
        {
            return Err(Error::InvalidDecrease { target, current });
        }
        self.store(target)
    }

    fn load(&self) -> Result<Option<u64>, Error> {
        if !self.db.exists(&self.key)? {
            return Ok(None);
        }
        let Some(bytes) = self.db.read_bin(&self.key)? else {
            return Ok(None);
        };
        match u64::decode_var(&bytes) {
            Some((value, _)) => Ok(Some(value)),
            None => Err(Error::Corrupted {
                key: self.key.clone(),
            }),
        }
    }

    fn store(&self, value: u64) -> Result<(), Error> {
        Ok(self.db.write_bin(&self.key, &value.encode_var_vec())?)
    }
}
