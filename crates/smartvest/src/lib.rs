//! `smartvest` - Registration and emergency profiles for smart safety vests
//!
//! This library keeps wearer registration records in a local store, turns
//! them into scannable emergency payloads and self-contained portable links,
//! and relays live telemetry from a vest to interested views.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod address;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod link;
pub mod logging;
pub mod payload;
pub mod record;
pub mod registration;
pub mod store;
pub mod telemetry;

pub use address::{verify_or_keep, AddressCheck, AddressVerifier, GeminiVerifier};
pub use config::Config;
pub use error::{Error, Result};
pub use export::{render_csv, ExportOutcome};
pub use link::{resolve_profile, LinkError, LinkQuery, ProfileLookup};
pub use logging::init_logging;
pub use payload::{emergency_card, qr_payload, QrMode};
pub use record::{BloodType, EmergencyContact, UserRecord};
pub use registration::{PhotoUpload, RegistrationForm};
pub use store::{ImportReport, RecordStore, SaveOutcome};
pub use telemetry::{BatteryStatus, Subscription, TelemetryChannel, TelemetryState, TelemetryUpdate};
