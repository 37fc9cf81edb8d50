//! CSV and JSON export of the record store.
//!
//! Exports are written as dated files into a target directory. An empty store
//! produces [`ExportOutcome::Empty`] and no file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::record::UserRecord;
use crate::store::RecordStore;

/// Fixed CSV header, one column per exported field.
pub const CSV_HEADER: [&str; 11] = [
    "ID",
    "Full Name",
    "National ID",
    "Age",
    "Blood Type",
    "Address",
    "Emergency Phone",
    "Contact Name",
    "Relationship",
    "Observations",
    "Username",
];

/// Result of an export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The export was written to this file.
    Written(PathBuf),
    /// Nothing to export; carries the notice to show the user.
    Empty(&'static str),
}

/// Render records as CSV text with [`CSV_HEADER`] and one row per record.
///
/// Free-text columns are always quoted. Other columns are quoted only when
/// they contain a delimiter, quote or line break. Embedded quotes are doubled.
#[must_use]
pub fn render_csv(records: &[UserRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    for r in records {
        let row = [
            bare(&r.id),
            quoted(&r.full_name),
            quoted(&r.national_id),
            r.age.to_string(),
            r.blood_type.to_string(),
            quoted(&r.address),
            bare(&r.emergency_phone),
            quoted(&r.emergency_contact.name),
            quoted(&r.emergency_contact.relationship),
            quoted(&r.medical_observations),
            quoted(r.username.as_deref().unwrap_or_default()),
        ];
        let _ = write!(out, "\n{}", row.join(","));
    }
    out
}

fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn bare(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        quoted(field)
    } else {
        field.to_string()
    }
}

/// File name of a CSV export made on `date`.
#[must_use]
pub fn csv_file_name(date: NaiveDate) -> String {
    format!("smartvest_records_{}.csv", date.format("%Y-%m-%d"))
}

/// File name of a JSON backup made on `date`.
#[must_use]
pub fn json_file_name(date: NaiveDate) -> String {
    format!("smartvest_backup_{}.json", date.format("%Y-%m-%d"))
}

impl RecordStore {
    /// Write all records as CSV into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the file cannot be written.
    pub fn export_csv(&self, dir: &Path) -> Result<ExportOutcome> {
        let users = self.get_users()?;
        if users.is_empty() {
            return Ok(ExportOutcome::Empty("There are no records to export."));
        }
        let path = dir.join(csv_file_name(Utc::now().date_naive()));
        write_export(&path, &render_csv(&users))?;

        info!(records = users.len(), "Exported CSV to {}", path.display());
        Ok(ExportOutcome::Written(path))
    }

    /// Write all records as a pretty-printed JSON backup into `dir`.
    ///
    /// The file is accepted as-is by [`RecordStore::import_json`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the file cannot be written.
    pub fn export_json(&self, dir: &Path) -> Result<ExportOutcome> {
        let users = self.get_users()?;
        if users.is_empty() {
            return Ok(ExportOutcome::Empty("There is no data to back up."));
        }
        let path = dir.join(json_file_name(Utc::now().date_naive()));
        write_export(&path, &serde_json::to_string_pretty(&users)?)?;

        info!(records = users.len(), "Exported JSON backup to {}", path.display());
        Ok(ExportOutcome::Written(path))
    }
}

fn write_export(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::record;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("smartvest_{name}_{}", std::process::id()))
    }

    #[test]
    fn test_render_csv_header() {
        let csv = render_csv(&[]);
        assert_eq!(
            csv,
            "ID,Full Name,National ID,Age,Blood Type,Address,Emergency Phone,Contact Name,Relationship,Observations,Username"
        );
    }

    #[test]
    fn test_render_csv_row() {
        let csv = render_csv(&[record("u1", "Ana Ruiz")]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "u1,\"Ana Ruiz\",\"1712345678\",42,A+,\"Av. Amazonas N34-120, Quito\",0991234567,\"María Pérez\",\"Sister\",\"Penicillin allergy\",\"ana\""
        );
    }

    #[test]
    fn test_render_csv_escapes_quotes() {
        let mut r = record("u1", "Ana \"La Flaca\" Ruiz");
        r.username = None;
        let csv = render_csv(&[r]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("u1,\"Ana \"\"La Flaca\"\" Ruiz\","));
        assert!(row.ends_with(",\"\""));
    }

    #[test]
    fn test_render_csv_quotes_bare_fields_when_needed() {
        let mut r = record("u1,x", "Ana");
        r.emergency_phone = "099, ext 2".to_string();
        let csv = render_csv(&[r]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("\"u1,x\","));
        assert!(row.contains(",\"099, ext 2\","));
    }

    #[test]
    fn test_file_names() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        assert_eq!(csv_file_name(date), "smartvest_records_2026-10-15.csv");
        assert_eq!(json_file_name(date), "smartvest_backup_2026-10-15.json");
    }

    #[test]
    fn test_export_csv_empty_store() {
        let store = RecordStore::open_in_memory().unwrap();
        let dir = temp_dir("export_empty");
        let _ = std::fs::remove_dir_all(&dir);

        let outcome = store.export_csv(&dir).unwrap();
        assert!(matches!(outcome, ExportOutcome::Empty(_)));
        assert!(!dir.exists());
    }

    #[test]
    fn test_export_json_empty_store() {
        let store = RecordStore::open_in_memory().unwrap();
        let outcome = store.export_json(&temp_dir("backup_empty")).unwrap();
        assert!(matches!(outcome, ExportOutcome::Empty(_)));
    }

    #[test]
    fn test_export_csv_writes_file() {
        let store = RecordStore::open_in_memory().unwrap();
        store.save_user(&record("u1", "Ana Ruiz")).unwrap();
        let dir = temp_dir("export_csv");

        let ExportOutcome::Written(path) = store.export_csv(&dir).unwrap() else {
            panic!("expected a written export");
        };
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("ID,Full Name"));
        assert!(contents.lines().nth(1).unwrap().starts_with("u1,\"Ana Ruiz\","));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_export_json_backup_restores() {
        let store = RecordStore::open_in_memory().unwrap();
        store.save_user(&record("u1", "Ana Ruiz")).unwrap();
        store.save_user(&record("u2", "José Núñez")).unwrap();
        let dir = temp_dir("export_json");

        let ExportOutcome::Written(path) = store.export_json(&dir).unwrap() else {
            panic!("expected a written export");
        };
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {"));

        let restored = RecordStore::open_in_memory().unwrap();
        let report = restored.import_json(&text).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(restored.get_users().unwrap(), store.get_users().unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
