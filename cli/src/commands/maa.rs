//! `cvm-attest maa` command - Exchange evidence for an attestation token.

use clap::Args;

use super::{build_attestor, decode_runtime_data, GlobalArgs};

#[derive(Args)]
pub struct MaaArgs {
    /// Attestation authority host, e.g. sharedeus.eus.attest.azure.net
    #[arg(long)]
    pub maa_endpoint: String,

    /// Runtime data (standard base64) sent as runtime claims
    #[arg(long)]
    pub runtime_data: String,
}

#[derive(serde::Serialize)]
struct MaaOutput {
    token: String,
}

pub async fn execute(global: &GlobalArgs, args: MaaArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime_data = decode_runtime_data(&args.runtime_data)?;
    let attestor = build_attestor(global)?;
    if !attestor.maa_enabled() {
        return Err(
            "token exchange unavailable: configure a certificate endpoint or provide host certificates"
                .into(),
        );
    }

    let maa = attestor.maa_endpoint(&args.maa_endpoint);
    let token = attestor.attest_maa(&maa, &runtime_data).await?;
    println!("{}", serde_json::to_string_pretty(&MaaOutput { token })?);
    Ok(())
}
