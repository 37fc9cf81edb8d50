//! Scannable code payloads.
//!
//! A code carries either a plain-text emergency card, readable by any
//! scanner without network access, or a portable link.

use std::fmt;

use crate::error::Result;
use crate::link;
use crate::record::UserRecord;

/// What a generated code encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrMode {
    /// Offline emergency card text.
    #[default]
    Text,
    /// Portable link carrying the full record.
    Link,
}

impl fmt::Display for QrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Link => write!(f, "link"),
        }
    }
}

const RULE: &str = "------------------";

/// The offline emergency card for a record.
#[must_use]
pub fn emergency_card(record: &UserRecord) -> String {
    format!(
        "SmartVest Emergency\n{RULE}\nPATIENT: {}\nID: {}\nBLOOD: {}\nAGE: {}\n{RULE}\nCONTACT: {}\nRELATIONSHIP: {}\nPHONE: {}\n{RULE}\nOBSERVATIONS: {}",
        record.full_name,
        record.national_id,
        record.blood_type,
        record.age,
        record.emergency_contact.name,
        record.emergency_contact.relationship,
        record.emergency_phone,
        record.medical_observations,
    )
}

/// The payload to encode in a code for `record`.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized for a link.
pub fn qr_payload(record: &UserRecord, mode: QrMode, link_base: &str) -> Result<String> {
    match mode {
        QrMode::Text => Ok(emergency_card(record)),
        QrMode::Link => link::portable_url(link_base, record),
    }
}

/// Suggested file name for a saved code image, e.g. `smartvest-ana-ruiz.png`.
#[must_use]
pub fn qr_file_name(record: &UserRecord) -> String {
    let slug = record
        .full_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    format!("smartvest-{slug}.png")
}
