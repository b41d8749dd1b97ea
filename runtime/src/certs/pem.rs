//! PEM helpers for certificate chains.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cvm_attest_core::error::{AttestError, Result};

const BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// Wrap a DER certificate in PEM armor with 64-column lines.
pub fn encode_certificate(der: &[u8]) -> Vec<u8> {
    let b64 = STANDARD.encode(der);
    let mut out = String::with_capacity(b64.len() + b64.len() / 64 + 64);
    out.push_str(BEGIN_CERTIFICATE);
    out.push('\n');
    for chunk in b64.as_bytes().chunks(64) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(END_CERTIFICATE);
    out.push('\n');
    out.into_bytes()
}

/// Split a PEM bundle into DER certificates, in bundle order.
pub fn certificates(bundle: &[u8]) -> Result<Vec<Vec<u8>>> {
    let text = String::from_utf8_lossy(bundle);
    text.split(END_CERTIFICATE)
        .filter_map(|block| {
            block
                .find(BEGIN_CERTIFICATE)
                .map(|start| &block[start + BEGIN_CERTIFICATE.len()..])
        })
        .map(pem_body_to_der)
        .collect()
}

fn pem_body_to_der(body: &str) -> Result<Vec<u8>> {
    let b64: String = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| AttestError::CertParse(format!("Failed to decode PEM certificate: {}", e)))
}
