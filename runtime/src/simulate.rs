//! Simulated SNP evidence for development and testing.
//!
//! When `CVM_ATTEST_SIMULATE=1` is set (or `--simulate` is passed), the
//! attestor builds reports with the correct field layout but no hardware
//! signature. Authorities will reject them; they exist to exercise the
//! pipeline off-hardware.

use async_trait::async_trait;
use cvm_attest_core::error::Result;

use crate::report::{SnpReport, SNP_REPORT_SIZE};
use crate::source::{ReportSource, RuntimeDigest};
use crate::tcb::TcbVersion;

/// Environment variable to enable simulation mode.
pub const SIMULATE_ENV: &str = "CVM_ATTEST_SIMULATE";

/// Check if simulation mode is enabled via environment variable.
pub fn is_simulate_mode() -> bool {
    std::env::var(SIMULATE_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Simulated report version marker. Real reports use 2.
pub const SIMULATED_REPORT_VERSION: u32 = 0xA3;

/// Simulated chip ID (all 0xA3 bytes, clearly fake).
pub const SIMULATED_CHIP_ID: [u8; 64] = [0xA3; 64];

/// Default simulated TCB: bl=3, tee=0, snp=8, ucode=115.
pub const SIMULATED_TCB: u64 = 0x7308_0000_0000_0003;

/// Build a simulated report with `digest` in the first half of
/// `report_data`.
pub fn build_simulated_report(digest: &RuntimeDigest, reported_tcb: u64) -> Result<Vec<u8>> {
    let mut report = SnpReport::from_bytes(&[0u8; SNP_REPORT_SIZE])?;
    report.version = SIMULATED_REPORT_VERSION;
    report.guest_svn = 1;

    let mut report_data = [0u8; 64];
    report_data[..32].copy_from_slice(digest);
    report.report_data = hex::encode(report_data);

    let measurement: Vec<u8> = (0..48u8).map(|i| i.wrapping_mul(0xA3)).collect();
    report.measurement = hex::encode(measurement);

    report.platform_version = reported_tcb;
    report.reported_tcb = reported_tcb;
    report.chip_id = hex::encode(SIMULATED_CHIP_ID);

    report.to_bytes()
}

/// Check if a raw report carries the simulation marker.
pub fn is_simulated_report(report: &[u8]) -> bool {
    report
        .get(0..4)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map(|b| u32::from_le_bytes(b) == SIMULATED_REPORT_VERSION)
        .unwrap_or(false)
}

/// Report source producing simulated reports at a fixed TCB.
#[derive(Debug, Clone)]
pub struct SimulatedReportSource {
    reported_tcb: u64,
}

impl SimulatedReportSource {
    pub fn new(reported_tcb: u64) -> Self {
        Self { reported_tcb }
    }

    pub fn reported_tcb(&self) -> TcbVersion {
        TcbVersion::from(self.reported_tcb)
    }
}

impl Default for SimulatedReportSource {
    fn default() -> Self {
        Self::new(SIMULATED_TCB)
    }
}

#[async_trait]
impl ReportSource for SimulatedReportSource {
    async fn fetch_report(&self, digest: &RuntimeDigest) -> Result<Vec<u8>> {
        tracing::warn!(tcb = %self.reported_tcb(), "Producing simulated SNP report");
        build_simulated_report(digest, self.reported_tcb)
    }
}
