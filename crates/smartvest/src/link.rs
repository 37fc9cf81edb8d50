//! Portable profile links.
//!
//! A portable link carries a whole [`UserRecord`] in its `data` query
//! parameter: the record's JSON, UTF-8 encoded, then base64 (URL-safe
//! alphabet, no padding). Scanning such a link shows the profile on a device
//! that has never seen the store. A local link carries only a `uid` and is
//! resolved against the local store.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::UserRecord;
use crate::store::RecordStore;

/// Query parameter holding an encoded record.
pub const DATA_PARAM: &str = "data";

/// Query parameter holding a bare record id.
pub const UID_PARAM: &str = "uid";

/// JSON key of the credential hash, stripped from portable tokens.
const PASSWORD_HASH_FIELD: &str = "passwordHash";

/// Why a portable link token could not be turned back into a record.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The token is empty.
    #[error("token is empty")]
    Empty,

    /// The token is not base64.
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not UTF-8 text.
    #[error("decoded token is not UTF-8 text: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The decoded text is not JSON.
    #[error("decoded token is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// The decoded JSON is not an object.
    #[error("decoded token is not a JSON object")]
    NotAnObject,

    /// The decoded object has no non-empty string `id`.
    #[error("decoded record has no id")]
    MissingId,

    /// The decoded object has an id but is not a complete record.
    #[error("decoded record is incomplete: {0}")]
    IncompleteRecord(#[source] serde_json::Error),
}

fn url_safe() -> GeneralPurpose {
    GeneralPurpose::new(
        &alphabet::URL_SAFE,
        GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
}

/// Tokens from older links use the standard alphabet with padding.
fn standard() -> GeneralPurpose {
    GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
}

/// Encode a record into a URL-safe token.
///
/// The password hash never leaves the device: it is left out of the token.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized.
pub fn encode(record: &UserRecord) -> Result<String> {
    let mut value = serde_json::to_value(record)?;
    if let Some(object) = value.as_object_mut() {
        object.remove(PASSWORD_HASH_FIELD);
    }
    let json = serde_json::to_vec(&value)?;
    Ok(url_safe().encode(json))
}

/// Decode a token produced by [`encode`] (or by an older standard-alphabet link).
///
/// # Errors
///
/// Returns a [`LinkError`] describing the first stage that failed.
pub fn decode(token: &str) -> std::result::Result<UserRecord, LinkError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(LinkError::Empty);
    }

    let bytes = match url_safe().decode(token) {
        Ok(bytes) => bytes,
        // Form decoding turns '+' into ' ' in legacy tokens.
        Err(first) => standard()
            .decode(token.replace(' ', "+"))
            .map_err(|_| first)?,
    };
    let text = String::from_utf8(bytes)?;
    let value: Value = serde_json::from_str(&text).map_err(LinkError::Json)?;

    let object = value.as_object().ok_or(LinkError::NotAnObject)?;
    match object.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => {}
        _ => return Err(LinkError::MissingId),
    }

    serde_json::from_value(value).map_err(LinkError::IncompleteRecord)
}

/// Build a portable link: `<base>?data=<token>`.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized.
pub fn portable_url(base: &str, record: &UserRecord) -> Result<String> {
    Ok(format!(
        "{}?{DATA_PARAM}={}",
        base.trim_end_matches('/'),
        encode(record)?
    ))
}

/// Build a local link: `<base>?uid=<id>`.
#[must_use]
pub fn local_url(base: &str, id: &str) -> String {
    format!(
        "{}?{UID_PARAM}={}",
        base.trim_end_matches('/'),
        urlencoding::encode(id)
    )
}

/// The profile parameters found in a link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkQuery {
    /// Encoded record, if present and non-empty.
    pub data: Option<String>,
    /// Bare record id, if present and non-empty.
    pub uid: Option<String>,
}

impl LinkQuery {
    /// Extract `data` and `uid` from a URL or a bare query string.
    ///
    /// Values are percent-decoded. `+` is kept literally. Empty values count
    /// as absent. The first occurrence of a parameter wins.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        let query = match url.split_once('?') {
            Some((_, q)) => q,
            None if url.contains('=') => url,
            None => "",
        };
        let query = query.split('#').next().unwrap_or_default();

        let mut parsed = Self::default();
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = match urlencoding::decode(value) {
                Ok(v) => v.into_owned(),
                Err(_) => value.to_string(),
            };
            if value.is_empty() {
                continue;
            }
            match key {
                DATA_PARAM if parsed.data.is_none() => parsed.data = Some(value),
                UID_PARAM if parsed.uid.is_none() => parsed.uid = Some(value),
                _ => {}
            }
        }
        parsed
    }
}

/// Outcome of opening a profile link.
#[derive(Debug)]
pub enum ProfileLookup {
    /// The link carried a full record. It has been saved to the local store.
    Portable(UserRecord),
    /// The link carried an id found in the local store.
    Local(UserRecord),
    /// The link carried a data token that could not be decoded.
    Corrupted(LinkError),
    /// The link carried an id unknown on this device.
    NotOnDevice(String),
    /// The link carried no profile parameters.
    NoData,
}

impl ProfileLookup {
    /// The resolved record, if any.
    #[must_use]
    pub fn record(&self) -> Option<&UserRecord> {
        match self {
            Self::Portable(r) | Self::Local(r) => Some(r),
            _ => None,
        }
    }

    /// Message to show when no record was resolved.
    #[must_use]
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Portable(_) | Self::Local(_) => None,
            Self::Corrupted(_) => Some("The data link appears to be damaged or incomplete."),
            Self::NotOnDevice(_) => Some(
                "User not found on this device. If you scanned an older code, make sure the data is synced.",
            ),
            Self::NoData => Some("This link does not contain any profile data."),
        }
    }
}

/// Resolve a scanned link against the store.
///
/// A `data` parameter takes precedence over `uid`. A decoded portable record
/// is saved into the store so later local links resolve on this device. A
/// password hash already stored for that id is kept.
///
/// # Errors
///
/// Returns an error only if the store cannot be read or written.
pub fn resolve_profile(url: &str, store: &RecordStore) -> Result<ProfileLookup> {
    let query = LinkQuery::parse(url);

    if let Some(token) = query.data {
        return match decode(&token) {
            Ok(mut record) => {
                if let Some(local) = store.get_user_by_id(&record.id)? {
                    record.password_hash = local.password_hash;
                }
                store.save_user(&record)?;
                debug!(id = %record.id, "Opened portable link");
                Ok(ProfileLookup::Portable(record))
            }
            Err(e) => {
                warn!("Corrupted portable link: {e}");
                Ok(ProfileLookup::Corrupted(e))
            }
        };
    }

    if let Some(uid) = query.uid {
        return Ok(match store.get_user_by_id(&uid)? {
            Some(record) => ProfileLookup::Local(record),
            None => ProfileLookup::NotOnDevice(uid),
        });
    }

    Ok(ProfileLookup::NoData)
}
