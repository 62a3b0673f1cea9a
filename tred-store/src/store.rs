//! In-memory keyspace with TTL semantics and write-ahead durability.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, info};
use tred_common::error::TredResult;

use crate::binlog::{Binlog, DEL_RECORD_MAGIC, ReplayError, SET_RECORD_MAGIC};
use crate::codec::BinlogReader;

/// Keyspace map type. Keys and values are arbitrary byte strings.
type Keyspace = HashMap<Vec<u8>, ValueEntry>;

/// One stored value with its optional expiration deadline.
///
/// `None` means "no expiry"; replay-reconstructed entries always carry `None` because the
/// on-disk record format has no TTL field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    /// Raw value payload.
    pub value: Vec<u8>,
    /// Absolute expiration deadline in unix milliseconds.
    pub expire_at_unix_ms: Option<u64>,
}

impl ValueEntry {
    fn is_expired(&self, now_unix_ms: u64) -> bool {
        self.expire_at_unix_ms
            .is_some_and(|deadline| now_unix_ms >= deadline)
    }
}

/// Write precondition carried by SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    /// Unconditional write.
    #[default]
    Always,
    /// Write only when the key is absent (`NX`); silently no-op otherwise.
    IfMissing,
    /// Write only when the key is present (`XX`); silently no-op otherwise.
    IfExists,
}

/// Durable key/value store.
///
/// Readers take the keyspace lock shared; `set` and `delete` take it exclusive and append
/// their binlog record while still holding it, so binlog order always equals apply order.
#[derive(Debug)]
pub struct Store {
    keyspace: RwLock<Keyspace>,
    binlog: Binlog,
}

impl Store {
    /// Opens the store at `path`, replaying the binlog into an empty keyspace first.
    ///
    /// # Errors
    ///
    /// Returns `TredError::Io` when the binlog cannot be opened or read, and
    /// `TredError::Corrupt` when replay hits an unknown or malformed record.
    pub fn open(path: &Path) -> TredResult<Self> {
        let mut keyspace = Keyspace::new();
        let binlog = Binlog::open(path, |magic, reader| {
            replay_record(&mut keyspace, magic, reader)
        })?;
        info!(keys = keyspace.len(), path = %path.display(), "replayed binlog");

        Ok(Self {
            keyspace: RwLock::new(keyspace),
            binlog,
        })
    }

    /// Writes `key = value` subject to `condition`, with an optional expiration deadline.
    ///
    /// A condition miss (NX on a present key, XX on an absent one) returns `Ok` without
    /// mutating the keyspace or the binlog. Presence is raw map presence; an expired entry
    /// that has not been observed yet still counts as present.
    ///
    /// # Errors
    ///
    /// Returns `TredError::Io` when the binlog append fails. The in-memory mutation has
    /// already been applied at that point and is not rolled back.
    pub fn set(
        &self,
        key: &[u8],
        value: &[u8],
        condition: SetCondition,
        expire_at_unix_ms: Option<u64>,
    ) -> TredResult<()> {
        let mut keyspace = self.keyspace.write();
        let key_exists = keyspace.contains_key(key);

        match condition {
            SetCondition::IfMissing if key_exists => {
                debug!("set skipped: NX with existing key");
                return Ok(());
            }
            SetCondition::IfExists if !key_exists => {
                debug!("set skipped: XX with missing key");
                return Ok(());
            }
            _ => {}
        }

        let _ = keyspace.insert(
            key.to_vec(),
            ValueEntry {
                value: value.to_vec(),
                expire_at_unix_ms,
            },
        );
        self.binlog
            .append(SET_RECORD_MAGIC, &encode_set_record(key, value))
    }

    /// Returns the value for `key` when present and not expired.
    ///
    /// Expired entries are logically absent but stay in the map until overwritten or deleted;
    /// there is no background sweeper.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let keyspace = self.keyspace.read();
        let entry = keyspace.get(key)?;
        if entry.is_expired(now_unix_millis()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Removes `key`, returning whether it was present.
    ///
    /// An expired-but-unobserved entry counts as present for deletion. Absent keys write no
    /// binlog record.
    ///
    /// # Errors
    ///
    /// Returns `TredError::Io` when the binlog append fails; the key is already gone from the
    /// keyspace at that point.
    pub fn delete(&self, key: &[u8]) -> TredResult<bool> {
        let mut keyspace = self.keyspace.write();
        if keyspace.remove(key).is_none() {
            return Ok(false);
        }
        self.binlog.append(DEL_RECORD_MAGIC, &encode_del_record(key))?;
        Ok(true)
    }

    /// Number of entries in the keyspace, counting expired-but-unobserved ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keyspace.read().len()
    }

    /// Whether the keyspace holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keyspace.read().is_empty()
    }

    /// Flushes and closes the binlog.
    ///
    /// # Errors
    ///
    /// Returns `TredError::InvalidState` on repeated close, and `TredError::Io` when the final
    /// flush or sync fails.
    pub fn close(&self) -> TredResult<()> {
        info!("closing store");
        self.binlog.close()
    }
}

/// Applies one replayed record to the keyspace being rebuilt.
fn replay_record(
    keyspace: &mut Keyspace,
    magic: u32,
    reader: &mut BinlogReader<BufReader<File>>,
) -> Result<(), ReplayError> {
    match magic {
        SET_RECORD_MAGIC => {
            let key_len = reader.read_u64()?;
            let value_len = reader.read_u64()?;
            let key = reader.read_exact(key_len)?;
            let value = reader.read_exact(value_len)?;
            // The record format carries no TTL, so replayed entries never expire.
            let _ = keyspace.insert(
                key,
                ValueEntry {
                    value,
                    expire_at_unix_ms: None,
                },
            );
            Ok(())
        }
        DEL_RECORD_MAGIC => {
            let key_len = reader.read_u64()?;
            let key = reader.read_exact(key_len)?;
            let _ = keyspace.remove(&key);
            Ok(())
        }
        unknown => Err(ReplayError::Corrupt(format!(
            "unknown record magic {unknown:#010x}"
        ))),
    }
}

fn encode_set_record(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16 + key.len() + value.len());
    payload.extend_from_slice(&(key.len() as u64).to_be_bytes());
    payload.extend_from_slice(&(value.len() as u64).to_be_bytes());
    payload.extend_from_slice(key);
    payload.extend_from_slice(value);
    payload
}

fn encode_del_record(key: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + key.len());
    payload.extend_from_slice(&(key.len() as u64).to_be_bytes());
    payload.extend_from_slice(key);
    payload
}

/// Milliseconds since the unix epoch for the current wall clock.
#[must_use]
pub fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
