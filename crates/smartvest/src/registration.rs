//! Turning a filled-in registration form into a [`UserRecord`].
//!
//! The store never validates what it is given; this is where the form's
//! required fields, age, photo size cap and password hashing are enforced.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::config::RegistrationConfig;
use crate::error::{Error, Result};
use crate::record::{BloodType, EmergencyContact, UserRecord, NO_OBSERVATIONS};

/// Oldest accepted age.
const MAX_AGE: u32 = 150;

/// A profile photo accepted for upload, held as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    data_url: String,
}

impl PhotoUpload {
    /// Load an image file, rejecting it before reading if it exceeds `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PhotoTooLarge`] for oversized files, an invalid-field
    /// error for non-image extensions, or an I/O error.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        if size > max_bytes {
            return Err(Error::PhotoTooLarge {
                path: path.to_path_buf(),
                size,
                limit: max_bytes,
            });
        }

        let mime = image_mime(path).ok_or_else(|| {
            Error::invalid_field(
                "photo",
                format!("{} is not a supported image type", path.display()),
            )
        })?;
        let bytes = std::fs::read(path)?;
        debug!(size, mime, "Accepted profile photo");

        Ok(Self {
            data_url: format!("data:{mime};base64,{}", STANDARD.encode(bytes)),
        })
    }

    /// The photo as a `data:` URL.
    #[must_use]
    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Raw registration input, as typed by staff.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    /// Full name (required).
    pub full_name: String,
    /// National id (required).
    pub national_id: String,
    /// Age as typed (required, whole number).
    pub age: String,
    /// Blood type.
    pub blood_type: BloodType,
    /// Home address (required).
    pub address: String,
    /// Emergency phone (required). Also used as the contact's phone.
    pub emergency_phone: String,
    /// Emergency contact name (required).
    pub contact_name: String,
    /// Emergency contact relationship (required).
    pub contact_relationship: String,
    /// Medical observations. Blank becomes "None".
    pub observations: String,
    /// Accepted profile photo.
    pub photo: Option<PhotoUpload>,
    /// Login name.
    pub username: String,
    /// Login password; only its hash is kept.
    pub password: String,
    /// Paired device id. Blank gets a random `VEST-<n>`.
    pub device_id: String,
}

impl RegistrationForm {
    /// Validate the form and build a new record with a fresh id and timestamp.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank required fields or a bad age, or
    /// a credential error if the password cannot be hashed.
    pub fn into_record(self, config: &RegistrationConfig) -> Result<UserRecord> {
        let full_name = required(self.full_name, "full_name")?;
        let national_id = required(self.national_id, "national_id")?;
        let age = parse_age(&self.age)?;
        let address = required(self.address, "address")?;
        let emergency_phone = required(self.emergency_phone, "emergency_phone")?;
        let contact_name = required(self.contact_name, "contact_name")?;
        let contact_relationship = required(self.contact_relationship, "contact_relationship")?;

        let password_hash = match optional(self.password) {
            Some(password) => Some(bcrypt::hash(password, config.password_cost)?),
            None => None,
        };
        let device_id = optional(self.device_id)
            .unwrap_or_else(|| format!("VEST-{}", rand::thread_rng().gen_range(0..1000)));

        Ok(UserRecord {
            id: Uuid::new_v4().to_string(),
            full_name,
            national_id,
            age,
            blood_type: self.blood_type,
            address,
            emergency_contact: EmergencyContact {
                name: contact_name,
                relationship: contact_relationship,
                phone: emergency_phone.clone(),
            },
            emergency_phone,
            medical_observations: optional(self.observations)
                .unwrap_or_else(|| NO_OBSERVATIONS.to_string()),
            created_at: Utc::now(),
            photo: self.photo.map(|p| p.data_url),
            username: optional(self.username),
            password_hash,
            device_id: Some(device_id),
        })
    }
}

fn required(value: String, field: &'static str) -> Result<String> {
    optional(value).ok_or_else(|| Error::missing_field(field))
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_age(raw: &str) -> Result<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::missing_field("age"));
    }
    let age: u32 = raw
        .parse()
        .map_err(|_| Error::invalid_field("age", format!("'{raw}' is not a whole number")))?;
    if age > MAX_AGE {
        return Err(Error::invalid_field(
            "age",
            format!("{age} is above the maximum of {MAX_AGE}"),
        ));
    }
    Ok(age)
}
