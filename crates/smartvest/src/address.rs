//! Optional address verification through a hosted text-generation model.
//!
//! Verification is advisory. When no service is configured, the request
//! fails, or the model finds nothing, the address as typed is kept.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AddressConfig;
use crate::error::Result;

/// Reply the model is asked to give when it cannot place an address.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Request header carrying the API key. The key is kept out of the URL,
/// which `reqwest` errors echo into logs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Something that can normalize a postal address.
#[async_trait]
pub trait AddressVerifier: Send + Sync {
    /// Return the corrected address, or `None` if it could not be found.
    async fn verify(&self, address: &str) -> Result<Option<String>>;
}

/// Outcome of [`verify_or_keep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCheck {
    /// The address to store.
    pub address: String,
    /// Whether `address` came back from the verifier.
    pub verified: bool,
}

/// Verify `address` if a verifier is available, falling back to the input.
pub async fn verify_or_keep(verifier: Option<&dyn AddressVerifier>, address: &str) -> AddressCheck {
    let keep = || AddressCheck {
        address: address.to_string(),
        verified: false,
    };

    let Some(verifier) = verifier else {
        debug!("No address verifier configured, keeping address as typed");
        return keep();
    };

    match verifier.verify(address).await {
        Ok(Some(corrected)) => AddressCheck {
            address: corrected,
            verified: true,
        },
        Ok(None) => {
            debug!("Address not found by verifier, keeping address as typed");
            keep()
        }
        Err(e) => {
            warn!("Address verification failed: {}", e);
            keep()
        }
    }
}

/// Verifier backed by the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiVerifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl fmt::Debug for GeminiVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiVerifier")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiVerifier {
    /// Build a verifier from configuration, or `None` if no API key is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AddressConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            warn!("Address API key is missing, skipping verification");
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
        }))
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

fn prompt(address: &str) -> String {
    format!(
        "Check whether the following address is valid and exists. \
         If it exists, return the correctly formatted address. \
         If it is ambiguous or cannot be found, suggest the most likely one.\n\n\
         Address: \"{address}\"\n\n\
         Reply ONLY with the corrected address. If nothing is found, reply \"{NOT_FOUND}\"."
    )
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

fn extract_address(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    let text = text.trim();
    if text.is_empty() || text.contains(NOT_FOUND) {
        None
    } else {
        Some(text.to_string())
    }
}

#[async_trait]
impl AddressVerifier for GeminiVerifier {
    async fn verify(&self, address: &str) -> Result<Option<String>> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt(address)),
                }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let data = response.json::<GenerateResponse>().await?;
        Ok(extract_address(data))
    }
}
