//! `cvm-attest status` command - Show attestation configuration.

use clap::Args;

use super::{build_attestor, GlobalArgs};

#[derive(Args)]
pub struct StatusArgs {}

pub async fn execute(global: &GlobalArgs, _args: StatusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let attestor = build_attestor(global)?;
    let status = attestor.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
