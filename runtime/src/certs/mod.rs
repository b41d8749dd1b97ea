//! VCEK certificate chain retrieval.
//!
//! The chain endorsing a report's signing key can come from three kinds of
//! endpoint:
//! - `AMD`: the AMD Key Distribution Service. The leaf is fetched as DER
//!   by chip id and SPLs, the ASK/ARK chain separately.
//! - `AzCache`: a caching proxy returning the whole PEM chain for a chip
//!   id and hex TCB.
//! - `LocalTHIM`: the host's instance metadata service, returning a
//!   base64 JSON document with the chain and its TCB.

pub mod pem;
pub mod vcek;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use cvm_attest_core::error::{AttestError, Result};
use cvm_attest_core::{CertEndpointConfig, ThimCerts};

use crate::http::HttpClient;
use crate::tcb::TcbVersion;

/// Default KDS path prefix when an AMD endpoint has no TEE type.
pub const AMD_KDS_DEFAULT_PATH: &str = "vcek/v1/Milan";

/// Recognised certificate endpoint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Amd,
    AzCache,
    LocalThim,
}

impl FromStr for EndpointKind {
    type Err = AttestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AMD" => Ok(Self::Amd),
            "AzCache" => Ok(Self::AzCache),
            "LocalTHIM" => Ok(Self::LocalThim),
            other => Err(AttestError::UnsupportedEndpoint(format!(
                "invalid endpoint type: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Amd => "AMD",
            Self::AzCache => "AzCache",
            Self::LocalThim => "LocalTHIM",
        };
        f.write_str(name)
    }
}

/// A fetched chain and the TCB it endorses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChainResponse {
    /// PEM text, leaf first.
    pub chain: Vec<u8>,
    pub tcb: u64,
}

/// Source of VCEK certificate chains.
#[async_trait]
pub trait CertChainSource: Send + Sync {
    async fn get_cert_chain(
        &self,
        endpoint: &CertEndpointConfig,
        chip_id: &str,
        reported_tcb: u64,
    ) -> Result<CertChainResponse>;
}

/// [`CertChainSource`] speaking to real endpoints over an [`HttpClient`].
pub struct CertChainProvider {
    http: Arc<dyn HttpClient>,
}

impl CertChainProvider {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url = %url, "Fetching certificate material");
        let response = self.http.get(url).await?;
        if !response.is_ok() {
            return Err(AttestError::Transport(format!(
                "{} returned HTTP {}",
                url, response.status
            )));
        }
        Ok(response.body)
    }

    async fn fetch_amd(
        &self,
        endpoint: &CertEndpointConfig,
        chip_id: &str,
        reported_tcb: u64,
    ) -> Result<CertChainResponse> {
        let tcb = TcbVersion::from(reported_tcb);
        let path = endpoint
            .tee_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(AMD_KDS_DEFAULT_PATH);

        let vcek_url = format!(
            "https://{}/{}/{}?ucodeSPL={}&snpSPL={}&teeSPL={}&blSPL={}",
            endpoint.endpoint, path, chip_id, tcb.microcode, tcb.snp, tcb.tee, tcb.boot_loader
        );
        let vcek_der = self.fetch(&vcek_url).await?;

        let chain_url = format!("https://{}/{}/cert_chain", endpoint.endpoint, path);
        let ask_ark = self.fetch(&chain_url).await?;

        let mut chain = pem::encode_certificate(&vcek_der);
        chain.extend_from_slice(&ask_ark);

        // KDS is addressed by the TCB itself, so the request TCB is the answer
        Ok(CertChainResponse {
            chain,
            tcb: reported_tcb,
        })
    }

    async fn fetch_az_cache(
        &self,
        endpoint: &CertEndpointConfig,
        chip_id: &str,
        reported_tcb: u64,
    ) -> Result<CertChainResponse> {
        let url = format!(
            "https://{}/{}/certificates/{}/{:x}?{}",
            endpoint.endpoint,
            endpoint.tee_type.as_deref().unwrap_or_default(),
            chip_id,
            reported_tcb,
            endpoint.api_version.as_deref().unwrap_or_default()
        );
        let chain = self.fetch(&url).await?;
        let tcb = vcek::tcb_from_chain(&chain)?;
        Ok(CertChainResponse { chain, tcb })
    }

    async fn fetch_local_thim(&self, endpoint: &CertEndpointConfig) -> Result<CertChainResponse> {
        let url = format!("https://{}", endpoint.endpoint);
        let body = self.fetch(&url).await?;
        let text = std::str::from_utf8(&body)
            .map_err(|e| AttestError::Decode(format!("THIM response is not text: {}", e)))?;
        let certs = ThimCerts::from_base64(text)?;
        Ok(CertChainResponse {
            tcb: certs.tcb()?,
            chain: certs.chain(),
        })
    }
}

#[async_trait]
impl CertChainSource for CertChainProvider {
    async fn get_cert_chain(
        &self,
        endpoint: &CertEndpointConfig,
        chip_id: &str,
        reported_tcb: u64,
    ) -> Result<CertChainResponse> {
        if endpoint.endpoint.is_empty() {
            return Err(AttestError::NotConfigured(
                "certificate endpoint is not set".to_string(),
            ));
        }
        let kind: EndpointKind = endpoint.endpoint_type.parse()?;

        tracing::info!(
            endpoint_type = %kind,
            reported_tcb = %format!("{:#x}", reported_tcb),
            "Refreshing VCEK certificate chain"
        );

        let response = match kind {
            EndpointKind::Amd => self.fetch_amd(endpoint, chip_id, reported_tcb).await?,
            EndpointKind::AzCache => self.fetch_az_cache(endpoint, chip_id, reported_tcb).await?,
            EndpointKind::LocalThim => self.fetch_local_thim(endpoint).await?,
        };

        tracing::debug!(
            chain_bytes = response.chain.len(),
            chain_tcb = %format!("{:#x}", response.tcb),
            "Fetched certificate chain"
        );
        Ok(response)
    }
}
