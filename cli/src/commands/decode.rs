//! `cvm-attest decode` command - Decode a report file as JSON.
//!
//! Accepts either the raw 1184-byte report or its hex encoding, as printed
//! by `cvm-attest raw`.

use std::path::{Path, PathBuf};

use clap::Args;
use cvm_attest_runtime::simulate::is_simulated_report;
use cvm_attest_runtime::{SnpReport, TcbVersion};

#[derive(Args)]
pub struct DecodeArgs {
    /// Report file (binary or hex text)
    pub file: PathBuf,
}

#[derive(serde::Serialize)]
struct DecodeOutput {
    report: SnpReport,
    reported_tcb: TcbVersion,
    simulated: bool,
}

pub async fn execute(args: DecodeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = read_report_file(&args.file)?;
    let report = SnpReport::from_bytes(&bytes)?;
    let output = DecodeOutput {
        reported_tcb: TcbVersion::from(report.reported_tcb),
        simulated: is_simulated_report(&bytes),
        report,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Read a report, hex-decoding it when the file is hex text.
fn read_report_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data = std::fs::read(path)
        .map_err(|e| format!("Failed to read report file {}: {}", path.display(), e))?;

    let text = String::from_utf8_lossy(&data);
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(hex::decode(trimmed)?);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvm_attest_runtime::simulate::{build_simulated_report, SIMULATED_TCB};

    #[test]
    fn test_read_binary_report() {
        let report = build_simulated_report(&[1u8; 32], SIMULATED_TCB).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &report).unwrap();
        assert_eq!(read_report_file(file.path()).unwrap(), report);
    }

    #[test]
    fn test_read_hex_report() {
        let report = build_simulated_report(&[2u8; 32], SIMULATED_TCB).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), format!("{}\n", hex::encode(&report))).unwrap();
        let bytes = read_report_file(file.path()).unwrap();
        assert_eq!(bytes, report);
        assert_eq!(SnpReport::from_bytes(&bytes).unwrap().reported_tcb, SIMULATED_TCB);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(read_report_file(Path::new("/nonexistent/report.bin")).is_err());
    }
}
