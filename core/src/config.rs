//! Attestation service configuration.
//!
//! The configuration is normally handed to the guest at startup as a
//! base64-encoded JSON blob (`{"certcache": {...}}`), but it can also be
//! loaded from a JSON or YAML file.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AttestError, Result};

/// Default location of the report tool inside the guest image.
pub const DEFAULT_REPORT_TOOL: &str = "/bin/get-snp-report";

/// Default TEE type segment of the attestation authority URL.
pub const DEFAULT_MAA_TEE_TYPE: &str = "SevSnpVM";

/// Default API version query of the attestation authority URL.
pub const DEFAULT_MAA_API_VERSION: &str = "api-version=2020-10-01";

/// Top-level attestation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestConfig {
    /// Certificate endpoint used to refresh the VCEK chain.
    #[serde(default, rename = "certcache", skip_serializing_if = "Option::is_none")]
    pub cert_cache: Option<CertEndpointConfig>,

    /// Evidence provider executable.
    #[serde(default = "default_report_tool")]
    pub report_tool: PathBuf,

    /// Device nodes whose presence indicates SEV-SNP guest support.
    #[serde(default = "default_device_paths")]
    pub device_paths: Vec<PathBuf>,

    /// Deadline for each blocking call (report tool, HTTP request).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Report/chain reconciliation retry bound.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Defaults for the attestation authority URL.
    #[serde(default)]
    pub maa: MaaDefaults,
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self {
            cert_cache: None,
            report_tool: default_report_tool(),
            device_paths: default_device_paths(),
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
            maa: MaaDefaults::default(),
        }
    }
}

impl AttestConfig {
    /// Parse the base64-encoded JSON startup blob.
    ///
    /// An empty string yields the default configuration.
    pub fn from_base64_json(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Ok(Self::default());
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AttestError::Config(format!("Failed to decode base64 config: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AttestError::Config(format!("Failed to parse config JSON: {}", e)))
    }

    /// Load a configuration file. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            AttestError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let config: Self = if is_yaml {
            serde_yaml::from_str(&data).map_err(|e| {
                AttestError::Config(format!("Failed to parse config {}: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&data).map_err(|e| {
                AttestError::Config(format!("Failed to parse config {}: {}", path.display(), e))
            })?
        };

        tracing::debug!(path = %path.display(), "Loaded attestation config");
        Ok(config)
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Certificate endpoint description.
///
/// `endpoint_type` stays a raw string so that an unknown type is reported
/// when a chain is requested rather than when the configuration is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertEndpointConfig {
    /// One of `AMD`, `AzCache`, `LocalTHIM`.
    pub endpoint_type: String,
    /// Host (and optional path) of the endpoint, without scheme.
    pub endpoint: String,
    /// TEE type path segment (e.g. `vcek/v1/Milan`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tee_type: Option<String>,
    /// API version query string (e.g. `api-version=2020-10-15-preview`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Bound on report/chain reconciliation rounds.
///
/// `max_attempts` is the number of chain refreshes allowed for one
/// request. The first report fetch is always made; every round after the
/// first re-fetches the report before refreshing the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

/// Defaults applied when a request names only the authority host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaaDefaults {
    #[serde(default = "default_maa_tee_type")]
    pub tee_type: String,
    #[serde(default = "default_maa_api_version")]
    pub api_version: String,
}

impl Default for MaaDefaults {
    fn default() -> Self {
        Self {
            tee_type: default_maa_tee_type(),
            api_version: default_maa_api_version(),
        }
    }
}

fn default_report_tool() -> PathBuf {
    PathBuf::from(DEFAULT_REPORT_TOOL)
}

fn default_device_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("/dev/sev"), PathBuf::from("/dev/sev-guest")]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    2
}

fn default_maa_tee_type() -> String {
    DEFAULT_MAA_TEE_TYPE.to_string()
}

fn default_maa_api_version() -> String {
    DEFAULT_MAA_API_VERSION.to_string()
}
