//! Raw report sources.
//!
//! A [`ReportSource`] turns a 32-byte digest into raw report bytes. The
//! device-backed source shells out to the report tool shipped in the guest
//! image; tests and development use the fixture and simulated sources.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use cvm_attest_core::error::{AttestError, Result};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Digest of the caller's runtime data, bound into the report's
/// `report_data` field.
pub type RuntimeDigest = [u8; 32];

/// SHA-256 of caller-supplied key/runtime material.
pub fn runtime_data_digest(runtime_data: &[u8]) -> RuntimeDigest {
    let mut hasher = Sha256::new();
    hasher.update(runtime_data);
    hasher.finalize().into()
}

/// Opaque hardware evidence provider.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Fetch a raw report with `digest` embedded as report data.
    async fn fetch_report(&self, digest: &RuntimeDigest) -> Result<Vec<u8>>;
}

/// Report source backed by `/dev/sev-guest` through the report tool.
///
/// The tool takes the hex digest as its only argument and prints the raw
/// report as hex on stdout.
pub struct DeviceReportSource {
    tool: PathBuf,
    device_paths: Vec<PathBuf>,
    timeout: Duration,
}

impl DeviceReportSource {
    pub fn new(tool: PathBuf, device_paths: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool,
            device_paths,
            timeout,
        }
    }

    /// Build from the attestation configuration.
    pub fn from_config(config: &cvm_attest_core::AttestConfig) -> Self {
        Self::new(
            config.report_tool.clone(),
            config.device_paths.clone(),
            config.timeout(),
        )
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Check that at least one attestation device node exists.
    pub fn probe_device(&self) -> Result<&Path> {
        self.device_paths
            .iter()
            .find(|p| p.exists())
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                let tried: Vec<String> = self
                    .device_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                AttestError::DeviceUnavailable(format!(
                    "no SEV-SNP guest device found (tried {})",
                    tried.join(", ")
                ))
            })
    }
}

#[async_trait]
impl ReportSource for DeviceReportSource {
    async fn fetch_report(&self, digest: &RuntimeDigest) -> Result<Vec<u8>> {
        let device = self.probe_device()?;
        tracing::debug!(device = %device.display(), tool = %self.tool.display(), "Fetching SNP report");

        let mut cmd = tokio::process::Command::new(&self.tool);
        cmd.arg(hex::encode(digest))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                AttestError::Timeout(format!(
                    "{} did not finish within {:?}",
                    self.tool.display(),
                    self.timeout
                ))
            })?
            .map_err(|e| {
                AttestError::Source(format!("failed to run {}: {}", self.tool.display(), e))
            })?;

        if !output.status.success() {
            return Err(AttestError::Source(format!(
                "{} exited with {}: {}",
                self.tool.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        decode_hex_output(&output.stdout)
    }
}

/// Decode the tool's hex output, rejecting partial or malformed output.
fn decode_hex_output(stdout: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(stdout)
        .map_err(|e| AttestError::Source(format!("report output is not text: {}", e)))?
        .trim();

    if text.is_empty() {
        return Err(AttestError::Source("report tool produced no output".to_string()));
    }

    let declared = text.len() / 2;
    if text.len() % 2 != 0 {
        return Err(AttestError::Source(format!(
            "decoding output not expected number of bytes: {} hex digits for {} bytes",
            text.len(),
            declared
        )));
    }

    hex::decode(text)
        .map_err(|e| AttestError::Source(format!("decoding output to hexstring failed: {}", e)))
}

/// Report source that replays scripted outputs in order.
///
/// Every digest passed in is recorded so tests can check what the
/// orchestrator bound into each report.
#[derive(Default)]
pub struct FixtureReportSource {
    reports: Mutex<VecDeque<Result<Vec<u8>>>>,
    digests: Mutex<Vec<RuntimeDigest>>,
}

impl FixtureReportSource {
    pub fn new<I>(reports: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            reports: Mutex::new(reports.into_iter().map(Ok).collect()),
            digests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another output (report bytes or an error).
    pub fn push(&self, report: Result<Vec<u8>>) {
        self.reports.lock().push_back(report);
    }

    /// Number of fetches made so far.
    pub fn calls(&self) -> usize {
        self.digests.lock().len()
    }

    /// Digests received, in call order.
    pub fn digests(&self) -> Vec<RuntimeDigest> {
        self.digests.lock().clone()
    }
}

#[async_trait]
impl ReportSource for FixtureReportSource {
    async fn fetch_report(&self, digest: &RuntimeDigest) -> Result<Vec<u8>> {
        self.digests.lock().push(*digest);
        self.reports
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AttestError::Source("fixture reports exhausted".to_string())))
    }
}
