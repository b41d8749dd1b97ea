//! `cvm-attest raw` command - Fetch a raw SNP report.
//!
//! The report is bound to the SHA-256 of the runtime data and printed as
//! hex without certificate reconciliation.

use clap::Args;

use super::{build_attestor, decode_runtime_data, GlobalArgs};

#[derive(Args)]
pub struct RawArgs {
    /// Runtime data (standard base64) to bind into the report
    #[arg(long)]
    pub runtime_data: String,
}

#[derive(serde::Serialize)]
struct RawOutput {
    /// Raw report (hex-encoded)
    report: String,
}

pub async fn execute(global: &GlobalArgs, args: RawArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime_data = decode_runtime_data(&args.runtime_data)?;
    let attestor = build_attestor(global)?;
    let report = attestor.raw_attest(&runtime_data).await?;
    println!("{}", serde_json::to_string_pretty(&RawOutput { report })?);
    Ok(())
}
