//! UVM security context handed to the guest by the host.
//!
//! The host provides three base64 blobs: the security policy, the platform
//! certificates for the physical host (a THIM document) and the reference
//! info endorsing the UVM image. They arrive either as files in a
//! `security-context-*` directory or as environment variables.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AttestError, Result};

/// Environment variable naming the security context directory.
pub const SECURITY_CONTEXT_DIR_ENV: &str = "UVM_SECURITY_CONTEXT_DIR";

/// Environment variable carrying the base64 security policy.
pub const SECURITY_POLICY_ENV: &str = "UVM_SECURITY_POLICY";

/// Environment variable carrying the base64 THIM certificate document.
pub const HOST_AMD_CERTIFICATE_ENV: &str = "UVM_HOST_AMD_CERTIFICATE";

/// Environment variable carrying the base64 UVM reference info.
pub const REFERENCE_INFO_ENV: &str = "UVM_REFERENCE_INFO";

/// Directory name prefix of the security context.
pub const SECURITY_CONTEXT_DIR_PREFIX: &str = "security-context-";

const POLICY_FILENAME: &str = "security-policy-base64";
const HOST_AMD_CERT_FILENAME: &str = "host-amd-cert-base64";
const REFERENCE_INFO_FILENAME: &str = "reference-info-base64";

/// Platform certificates as served by THIM (base64-encoded JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThimCerts {
    /// PEM VCEK leaf certificate.
    #[serde(default)]
    pub vcek_cert: String,
    /// Hex TCB version the leaf was issued for.
    #[serde(default)]
    pub tcbm: String,
    /// PEM ASK + ARK chain.
    #[serde(default)]
    pub certificate_chain: String,
    #[serde(default)]
    pub cache_control: String,
}

impl ThimCerts {
    /// Decode a base64(JSON) THIM document.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let json = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AttestError::Decode(format!("base64 decoding platform certs failed: {}", e)))?;

        serde_json::from_slice(&json)
            .map_err(|e| AttestError::Decode(format!("json unmarshal platform certs failed: {}", e)))
    }

    /// Leaf certificate followed by the endorsing chain.
    pub fn chain(&self) -> Vec<u8> {
        let mut chain = Vec::with_capacity(self.vcek_cert.len() + self.certificate_chain.len());
        chain.extend_from_slice(self.vcek_cert.as_bytes());
        chain.extend_from_slice(self.certificate_chain.as_bytes());
        chain
    }

    /// TCB version of the leaf, parsed from the hex `tcbm` field.
    pub fn tcb(&self) -> Result<u64> {
        let tcbm = self.tcbm.trim();
        let digits = tcbm
            .strip_prefix("0x")
            .or_else(|| tcbm.strip_prefix("0X"))
            .unwrap_or(tcbm);
        u64::from_str_radix(digits, 16).map_err(|e| {
            AttestError::Decode(format!("Unable to convert TCBM {:?} to a uint64: {}", self.tcbm, e))
        })
    }
}

/// Security context of the running UVM.
#[derive(Debug, Clone, Default)]
pub struct UvmInformation {
    /// Base64 customer security policy.
    pub encoded_security_policy: String,
    /// Platform certificates for the physical host, if provided.
    pub initial_certs: Option<ThimCerts>,
    /// Base64 endorsements for the UVM image.
    pub encoded_uvm_reference_info: String,
}

impl UvmInformation {
    /// Load from the security context directory if `UVM_SECURITY_CONTEXT_DIR`
    /// is set, otherwise from the `UVM_*` environment variables.
    pub fn load() -> Result<Self> {
        match std::env::var(SECURITY_CONTEXT_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => Self::from_dir(Path::new(&dir)),
            _ => Self::from_env(),
        }
    }

    /// Load from the `UVM_*` environment variables. Missing variables are
    /// treated as empty.
    pub fn from_env() -> Result<Self> {
        let host_certs = std::env::var(HOST_AMD_CERTIFICATE_ENV).unwrap_or_default();
        Ok(Self {
            encoded_security_policy: std::env::var(SECURITY_POLICY_ENV).unwrap_or_default(),
            initial_certs: parse_initial_certs(&host_certs)?,
            encoded_uvm_reference_info: std::env::var(REFERENCE_INFO_ENV).unwrap_or_default(),
        })
    }

    /// Load from the three files of a security context directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let host_certs = read_context_file(dir, HOST_AMD_CERT_FILENAME)?;
        let info = Self {
            initial_certs: parse_initial_certs(&host_certs)?,
            encoded_security_policy: read_context_file(dir, POLICY_FILENAME)?,
            encoded_uvm_reference_info: read_context_file(dir, REFERENCE_INFO_FILENAME)?,
        };
        tracing::debug!(
            dir = %dir.display(),
            has_initial_certs = info.initial_certs.is_some(),
            "Loaded UVM security context"
        );
        Ok(info)
    }

    /// Decoded security policy (inittime data).
    pub fn security_policy(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.encoded_security_policy.trim())
            .map_err(|e| AttestError::Decode(format!("decoding policy from Base64 format failed: {}", e)))
    }

    /// Decoded UVM reference info (endorsements).
    pub fn reference_info(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.encoded_uvm_reference_info.trim())
            .map_err(|e| {
                AttestError::Decode(format!("decoding reference info from Base64 format failed: {}", e))
            })
    }
}

/// Find a `security-context-*` directory directly under `root`.
pub fn discover_security_context_dir(root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    entries
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(SECURITY_CONTEXT_DIR_PREFIX)
        })
        .map(|e| e.path())
}

fn parse_initial_certs(encoded: &str) -> Result<Option<ThimCerts>> {
    if encoded.trim().is_empty() {
        return Ok(None);
    }
    ThimCerts::from_base64(encoded).map(Some)
}

fn read_context_file(dir: &Path, filename: &str) -> Result<String> {
    let path = dir.join(filename);
    std::fs::read_to_string(&path)
        .map_err(|e| AttestError::Config(format!("reading {} failed: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn thim_json() -> String {
        r#"{"vcekCert":"-----BEGIN CERTIFICATE-----\nVCEK\n-----END CERTIFICATE-----\n","tcbm":"DB18000000000004","certificateChain":"-----BEGIN CERTIFICATE-----\nASK\n-----END CERTIFICATE-----\n","cacheControl":"86400"}"#.to_string()
    }

    #[test]
    fn test_thim_certs_from_base64() {
        let certs = ThimCerts::from_base64(&STANDARD.encode(thim_json())).unwrap();
        assert_eq!(certs.cache_control, "86400");
        assert_eq!(certs.tcb().unwrap(), 0xDB18000000000004);
        let chain = String::from_utf8(certs.chain()).unwrap();
        assert!(chain.starts_with("-----BEGIN CERTIFICATE-----\nVCEK"));
        assert!(chain.ends_with("ASK\n-----END CERTIFICATE-----\n"));
    }

    #[test]
    fn test_thim_certs_invalid_base64() {
        let result = ThimCerts::from_base64("***");
        assert!(matches!(result, Err(AttestError::Decode(_))));
    }

    #[test]
    fn test_thim_certs_invalid_json() {
        let result = ThimCerts::from_base64(&STANDARD.encode("[1,2"));
        assert!(matches!(result, Err(AttestError::Decode(_))));
    }

    #[test]
    fn test_thim_tcb_invalid_hex() {
        let certs = ThimCerts {
            tcbm: "xyz".to_string(),
            ..Default::default()
        };
        assert!(matches!(certs.tcb(), Err(AttestError::Decode(_))));
    }

    #[test]
    fn test_thim_tcb_with_prefix() {
        let certs = ThimCerts {
            tcbm: "0x0d".to_string(),
            ..Default::default()
        };
        assert_eq!(certs.tcb().unwrap(), 13);
    }

    #[test]
    fn test_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(POLICY_FILENAME), STANDARD.encode("package policy")).unwrap();
        std::fs::write(
            dir.path().join(HOST_AMD_CERT_FILENAME),
            STANDARD.encode(thim_json()),
        )
        .unwrap();
        std::fs::write(dir.path().join(REFERENCE_INFO_FILENAME), STANDARD.encode("cose")).unwrap();

        let info = UvmInformation::from_dir(dir.path()).unwrap();
        assert_eq!(info.security_policy().unwrap(), b"package policy");
        assert_eq!(info.reference_info().unwrap(), b"cose");
        assert_eq!(
            info.initial_certs.unwrap().tcb().unwrap(),
            0xDB18000000000004
        );
    }

    #[test]
    fn test_from_dir_empty_host_certs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(POLICY_FILENAME), "").unwrap();
        std::fs::write(dir.path().join(HOST_AMD_CERT_FILENAME), "").unwrap();
        std::fs::write(dir.path().join(REFERENCE_INFO_FILENAME), "").unwrap();

        let info = UvmInformation::from_dir(dir.path()).unwrap();
        assert!(info.initial_certs.is_none());
        assert!(info.security_policy().unwrap().is_empty());
    }

    #[test]
    fn test_from_dir_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = UvmInformation::from_dir(dir.path());
        assert!(matches!(result, Err(AttestError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::remove_var(SECURITY_CONTEXT_DIR_ENV);
        std::env::set_var(SECURITY_POLICY_ENV, STANDARD.encode("p"));
        std::env::set_var(REFERENCE_INFO_ENV, STANDARD.encode("r"));
        std::env::remove_var(HOST_AMD_CERTIFICATE_ENV);

        let info = UvmInformation::load().unwrap();
        assert_eq!(info.security_policy().unwrap(), b"p");
        assert_eq!(info.reference_info().unwrap(), b"r");
        assert!(info.initial_certs.is_none());

        std::env::remove_var(SECURITY_POLICY_ENV);
        std::env::remove_var(REFERENCE_INFO_ENV);
    }

    #[test]
    #[serial]
    fn test_load_prefers_context_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(POLICY_FILENAME), STANDARD.encode("from-file")).unwrap();
        std::fs::write(dir.path().join(HOST_AMD_CERT_FILENAME), "").unwrap();
        std::fs::write(dir.path().join(REFERENCE_INFO_FILENAME), "").unwrap();

        std::env::set_var(SECURITY_CONTEXT_DIR_ENV, dir.path());
        std::env::set_var(SECURITY_POLICY_ENV, STANDARD.encode("from-env"));

        let info = UvmInformation::load().unwrap();
        assert_eq!(info.security_policy().unwrap(), b"from-file");

        std::env::remove_var(SECURITY_CONTEXT_DIR_ENV);
        std::env::remove_var(SECURITY_POLICY_ENV);
    }

    #[test]
    fn test_discover_security_context_dir() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("other")).unwrap();
        std::fs::create_dir(root.path().join("security-context-1234")).unwrap();

        let found = discover_security_context_dir(root.path()).unwrap();
        assert_eq!(found, root.path().join("security-context-1234"));
    }

    #[test]
    fn test_discover_security_context_dir_none() {
        let root = tempfile::tempdir().unwrap();
        assert!(discover_security_context_dir(root.path()).is_none());
    }
}
