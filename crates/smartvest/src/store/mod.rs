//! Record store for smartvest.
//!
//! Records are kept as one JSON array in a single named slot of a `SQLite`
//! key-value table. Every write re-serializes and replaces the whole list, so
//! a write is atomic from the caller's point of view. The list order is
//! insertion order; updating a record keeps its position.

pub mod migrations;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_SLOT_KEY};
use crate::error::{Error, Result};
use crate::record::UserRecord;

/// Cleartext password field written by older backups.
const LEGACY_PASSWORD_FIELD: &str = "password";
const PASSWORD_HASH_FIELD: &str = "passwordHash";

/// Store of registered user records, keyed by `id`.
#[derive(Debug)]
pub struct RecordStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Key of the slot holding the record list.
    slot: String,
    /// bcrypt cost for passwords hashed during import.
    password_cost: u32,
}

/// Whether [`RecordStore::save_user`] added or replaced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No record had this id; it was appended.
    Inserted,
    /// A record with this id was replaced in place.
    Replaced,
}

/// Structured result of [`RecordStore::import_json`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Whether the input was accepted and merged.
    pub success: bool,
    /// Number of ids that were not in the store before.
    pub count: usize,
    /// Number of existing records that were overwritten.
    pub updated: usize,
    /// Number of entries skipped for lacking `id`, `fullName` or `nationalId`,
    /// or for not being a readable record.
    pub skipped: usize,
    /// Number of entries whose cleartext `password` was replaced by a hash.
    pub passwords_hashed: usize,
    /// Human-readable summary.
    pub message: String,
}

impl ImportReport {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            updated: 0,
            skipped: 0,
            passwords_hashed: 0,
            message: message.into(),
        }
    }

    fn merged(count: usize, updated: usize, skipped: usize, passwords_hashed: usize) -> Self {
        let mut message = format!("Import successful. {count} new users added.");
        if skipped > 0 {
            message.push_str(&format!(" {skipped} entries skipped."));
        }
        Self {
            success: true,
            count,
            updated,
            skipped,
            passwords_hashed,
            message,
        }
    }
}

impl RecordStore {
    /// Open or create a store at the given path using the given slot key.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>, slot: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening record store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        info!("Record store opened at {}", path.display());
        Ok(Self {
            path,
            conn,
            slot: slot.into(),
            password_cost: bcrypt::DEFAULT_COST,
        })
    }

    /// Open the store described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::open(config.database_path(), config.storage.slot_key.clone())?
            .with_password_cost(config.registration.password_cost))
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
            slot: DEFAULT_SLOT_KEY.to_string(),
            password_cost: bcrypt::DEFAULT_COST,
        })
    }

    /// Set the bcrypt cost used when an imported entry carries a cleartext password.
    #[must_use]
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the slot key.
    #[must_use]
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Insert a record, or replace the stored record with the same id.
    ///
    /// Field shapes are not validated here.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read or written.
    pub fn save_user(&self, record: &UserRecord) -> Result<SaveOutcome> {
        let mut users = self.get_users()?;
        let outcome = match users.iter().position(|u| u.id == record.id) {
            Some(index) => {
                users[index] = record.clone();
                SaveOutcome::Replaced
            }
            None => {
                users.push(record.clone());
                SaveOutcome::Inserted
            }
        };
        self.write_slot(&users)?;

        debug!(id = %record.id, ?outcome, "Saved user record");
        Ok(outcome)
    }

    /// All records in stored order. Empty if nothing was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read or does not hold a record list.
    pub fn get_users(&self) -> Result<Vec<UserRecord>> {
        let stored: Option<String> = self
            .conn
            .query_row(schema::SELECT_SLOT, [&self.slot], |row| row.get(0))
            .optional()?;

        match stored {
            None => Ok(Vec::new()),
            Some(json) => serde_json::from_str(&json).map_err(|source| Error::CorruptSlot {
                slot: self.slot.clone(),
                source,
            }),
        }
    }

    /// The first record with the given id, or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.get_users()?.into_iter().find(|u| u.id == id))
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read.
    pub fn count(&self) -> Result<usize> {
        Ok(self.get_users()?.len())
    }

    /// Find the record with this username and check the password against its hash.
    ///
    /// Returns `None` for an unknown username, a record without a password, or
    /// a wrong password.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read or the stored hash is malformed.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let Some(user) = self
            .get_users()?
            .into_iter()
            .find(|u| u.username.as_deref() == Some(username))
        else {
            debug!(username, "Login attempt for unknown username");
            return Ok(None);
        };

        let Some(hash) = user.password_hash.as_deref() else {
            debug!(username, "Login attempt for user without password");
            return Ok(None);
        };

        if bcrypt::verify(password, hash)? {
            info!(id = %user.id, "User authenticated");
            Ok(Some(user))
        } else {
            warn!(username, "Rejected login with wrong password");
            Ok(None)
        }
    }

    /// Merge a JSON backup into the store.
    ///
    /// The text must be a JSON array. Entries with non-empty `id`, `fullName`
    /// and `nationalId` are inserted or overwrite the stored record with the
    /// same id; other entries are skipped. Local records absent from the input
    /// are kept. Malformed input is reported in the returned [`ImportReport`]
    /// and leaves the store untouched.
    ///
    /// Older backups may carry a cleartext `password` instead of a
    /// `passwordHash`. Such passwords are hashed at the store's bcrypt cost so
    /// the login keeps working; the cleartext is never stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store itself cannot be read or written, or if
    /// a legacy password cannot be hashed.
    pub fn import_json(&self, text: &str) -> Result<ImportReport> {
        let items = match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("Rejected import: top-level JSON value is not a list");
                return Ok(ImportReport::failure(
                    "The file is not in the expected format (it must be a list of records).",
                ));
            }
            Err(e) => {
                warn!("Rejected import: {e}");
                return Ok(ImportReport::failure(
                    "Could not read the file. Make sure it is a valid SmartVest JSON backup.",
                ));
            }
        };

        let mut merged = self.get_users()?;
        let mut index: HashMap<String, usize> = merged
            .iter()
            .enumerate()
            .map(|(i, u)| (u.id.clone(), i))
            .collect();
        let (mut added, mut updated, mut skipped, mut hashed) = (0, 0, 0, 0);

        for mut item in items {
            if !has_required_identity(&item) {
                skipped += 1;
                continue;
            }
            if self.hash_legacy_password(&mut item)? {
                hashed += 1;
            }
            let record: UserRecord = match serde_json::from_value(item) {
                Ok(record) => record,
                Err(e) => {
                    debug!("Skipping unreadable record in import: {e}");
                    skipped += 1;
                    continue;
                }
            };

            if let Some(&i) = index.get(&record.id) {
                merged[i] = record;
                updated += 1;
            } else {
                index.insert(record.id.clone(), merged.len());
                merged.push(record);
                added += 1;
            }
        }

        self.write_slot(&merged)?;
        info!(added, updated, skipped, hashed, "Imported records");
        Ok(ImportReport::merged(added, updated, skipped, hashed))
    }

    /// Replace a cleartext `password` with a `passwordHash`, unless the entry
    /// already has a hash. The cleartext is removed either way.
    fn hash_legacy_password(&self, item: &mut Value) -> Result<bool> {
        let Some(object) = item.as_object_mut() else {
            return Ok(false);
        };
        let Some(Value::String(password)) = object.remove(LEGACY_PASSWORD_FIELD) else {
            return Ok(false);
        };
        let has_hash = object
            .get(PASSWORD_HASH_FIELD)
            .and_then(Value::as_str)
            .is_some_and(|h| !h.is_empty());
        if has_hash || password.is_empty() {
            return Ok(false);
        }

        let hash = bcrypt::hash(&password, self.password_cost)?;
        object.insert(PASSWORD_HASH_FIELD.to_string(), Value::String(hash));
        Ok(true)
    }

    /// Replace the whole slot with the given list.
    fn write_slot(&self, users: &[UserRecord]) -> Result<()> {
        let json = serde_json::to_string(users)?;
        self.conn.execute(schema::UPSERT_SLOT, (&self.slot, json))?;
        Ok(())
    }
}

/// Non-empty string `id`, `fullName` and `nationalId`.
fn has_required_identity(item: &Value) -> bool {
    ["id", "fullName", "nationalId"].iter().all(|key| {
        item.get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    })
}
