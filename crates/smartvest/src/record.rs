//! Core record types for smartvest.
//!
//! A [`UserRecord`] is one registered person's identity, medical and
//! emergency-contact profile. The JSON shape (camelCase field names) is the
//! one persisted in the store, written to backups and carried inside
//! portable links, so it must stay stable.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value stored in `medicalObservations` when nothing was entered.
pub const NO_OBSERVATIONS: &str = "None";

/// ABO/Rh blood group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BloodType {
    /// O positive.
    #[default]
    #[serde(rename = "O+")]
    OPositive,
    /// O negative.
    #[serde(rename = "O-")]
    ONegative,
    /// A positive.
    #[serde(rename = "A+")]
    APositive,
    /// A negative.
    #[serde(rename = "A-")]
    ANegative,
    /// B positive.
    #[serde(rename = "B+")]
    BPositive,
    /// B negative.
    #[serde(rename = "B-")]
    BNegative,
    /// AB positive.
    #[serde(rename = "AB+")]
    ABPositive,
    /// AB negative.
    #[serde(rename = "AB-")]
    ABNegative,
}

impl BloodType {
    /// All blood types, in the order offered on the registration form.
    pub const ALL: [Self; 8] = [
        Self::OPositive,
        Self::ONegative,
        Self::APositive,
        Self::ANegative,
        Self::BPositive,
        Self::BNegative,
        Self::ABPositive,
        Self::ABNegative,
    ];

    /// The conventional label, e.g. `AB-`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OPositive => "O+",
            Self::ONegative => "O-",
            Self::APositive => "A+",
            Self::ANegative => "A-",
            Self::BPositive => "B+",
            Self::BNegative => "B-",
            Self::ABPositive => "AB+",
            Self::ABNegative => "AB-",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown blood type '{s}' (expected one of O+, O-, A+, A-, B+, B-, AB+, AB-)"))
    }
}

/// Person to call in an emergency.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmergencyContact {
    /// Contact's name.
    pub name: String,
    /// Relationship to the wearer (e.g. "Sister").
    pub relationship: String,
    /// Contact phone number.
    pub phone: String,
}

/// A registered wearer's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Unique, immutable identifier (UUID v4 for records created here).
    pub id: String,
    /// Full name.
    pub full_name: String,
    /// National identity document number.
    pub national_id: String,
    /// Age in years.
    pub age: u32,
    /// Blood group.
    pub blood_type: BloodType,
    /// Home address.
    pub address: String,
    /// Emergency phone number.
    pub emergency_phone: String,
    /// Emergency contact. Its phone usually repeats `emergency_phone`.
    pub emergency_contact: EmergencyContact,
    /// Allergies, chronic conditions, medication.
    #[serde(default = "default_observations")]
    pub medical_observations: String,
    /// When the record was created. Never updated.
    pub created_at: DateTime<Utc>,
    /// Inline `data:` URL of the profile photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Login name for the companion system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// bcrypt hash of the login password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Identifier of the paired vest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

fn default_observations() -> String {
    NO_OBSERVATIONS.to_string()
}

impl UserRecord {
    /// Whether the record carries the fields an import requires:
    /// non-empty `id`, `fullName` and `nationalId`.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        !self.id.is_empty() && !self.full_name.is_empty() && !self.national_id.is_empty()
    }

    /// The leading segment of the id, shown under printed codes.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn test_blood_type_display() {
        assert_eq!(BloodType::OPositive.to_string(), "O+");
        assert_eq!(BloodType::ABNegative.to_string(), "AB-");
    }

    #[test]
    fn test_blood_type_from_str() {
        assert_eq!("ab+".parse::<BloodType>(), Ok(BloodType::ABPositive));
        assert_eq!(" O- ".parse::<BloodType>(), Ok(BloodType::ONegative));
        assert!("C+".parse::<BloodType>().is_err());
    }

    #[test]
    fn test_blood_type_serde_labels() {
        for t in BloodType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_record_json_uses_camel_case() {
        let json = serde_json::to_value(record("u1", "Ana Ruiz")).unwrap();
        assert_eq!(json["fullName"], "Ana Ruiz");
        assert_eq!(json["nationalId"], "1712345678");
        assert_eq!(json["bloodType"], "A+");
        assert_eq!(json["emergencyContact"]["relationship"], "Sister");
        assert!(json.get("photo").is_none());
    }

    #[test]
    fn test_missing_observations_default_to_sentinel() {
        let mut json = serde_json::to_value(record("u1", "Ana Ruiz")).unwrap();
        json.as_object_mut().unwrap().remove("medicalObservations");
        let parsed: UserRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.medical_observations, NO_OBSERVATIONS);
    }

    #[test]
    fn test_legacy_cleartext_password_is_dropped() {
        let mut json = serde_json::to_value(record("u1", "Ana Ruiz")).unwrap();
        json["password"] = serde_json::json!("hunter2");
        let parsed: UserRecord = serde_json::from_value(json).unwrap();
        assert!(parsed.password_hash.is_none());
        assert!(!serde_json::to_string(&parsed).unwrap().contains("hunter2"));
    }

    #[test]
    fn test_has_identity() {
        let mut r = record("u1", "Ana Ruiz");
        assert!(r.has_identity());
        r.national_id.clear();
        assert!(!r.has_identity());
    }

    #[test]
    fn test_short_id() {
        let r = record("3f2a9c1e-0000-4000-8000-000000000000", "Ana Ruiz");
        assert_eq!(r.short_id(), "3f2a9c1e");
        assert_eq!(record("u1", "Ana").short_id(), "u1");
    }
}
