//! Evidence collection and token exchange.
//!
//! [`Attestor`] owns the process-wide [`AttestationContext`] and runs the
//! report/chain reconciliation before anything is sent to the authority.
//! The authority checks the report signature against the chain's leaf, so
//! a report is only ever submitted with a chain endorsing the same TCB.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use cvm_attest_core::error::{AttestError, Result};
use cvm_attest_core::{AttestConfig, CertEndpointConfig, MaaDefaults, RetryPolicy, UvmInformation};

use crate::certs::{CertChainProvider, CertChainSource};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::maa::{MaaClient, MaaEndpoint, MaaRequest};
use crate::report::SnpReport;
use crate::simulate::SimulatedReportSource;
use crate::source::{runtime_data_digest, DeviceReportSource, ReportSource, RuntimeDigest};
use crate::tcb::TcbVersion;

/// Cached endorsement state shared by all requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestationContext {
    /// TCB endorsed by `cert_chain`.
    pub tcb: u64,
    /// PEM chain, leaf first.
    pub cert_chain: Vec<u8>,
    pub endpoint: CertEndpointConfig,
}

impl AttestationContext {
    /// Seed from the host-provided certificates, if any. Without them the
    /// cache is empty, which forces a refresh on first use.
    pub fn new(endpoint: CertEndpointConfig, uvm: &UvmInformation) -> Result<Self> {
        let mut context = Self {
            endpoint,
            ..Default::default()
        };
        if let Some(certs) = &uvm.initial_certs {
            context.tcb = certs.tcb()?;
            context.cert_chain = certs.chain();
        }
        Ok(context)
    }

    /// Whether the cached chain endorses `tcb`. An empty cache endorses
    /// nothing, even a zero TCB.
    pub fn endorses(&self, tcb: u64) -> bool {
        !self.cert_chain.is_empty() && self.tcb == tcb
    }
}

/// A decoded report together with a chain endorsing its TCB.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub raw: Vec<u8>,
    pub report: SnpReport,
    pub cert_chain: Vec<u8>,
}

/// Summary reported by `cvm-attest status`.
#[derive(Debug, Clone, Serialize)]
pub struct AttestorStatus {
    pub maa_enabled: bool,
    pub endpoint_type: String,
    pub endpoint: String,
    pub cached_tcb: String,
    pub cached_tcb_version: TcbVersion,
    pub max_attempts: u32,
}

/// Attestation pipeline: report source, chain source and authority client.
pub struct Attestor {
    source: Arc<dyn ReportSource>,
    certs: Arc<dyn CertChainSource>,
    maa: MaaClient,
    context: Mutex<AttestationContext>,
    uvm: UvmInformation,
    retry: RetryPolicy,
    maa_defaults: MaaDefaults,
    maa_enabled: bool,
}

impl Attestor {
    pub fn new(
        source: Arc<dyn ReportSource>,
        certs: Arc<dyn CertChainSource>,
        maa: MaaClient,
        context: AttestationContext,
        uvm: UvmInformation,
    ) -> Self {
        let maa_enabled = !context.endpoint.endpoint.is_empty() || uvm.initial_certs.is_some();
        Self {
            source,
            certs,
            maa,
            context: Mutex::new(context),
            uvm,
            retry: RetryPolicy::default(),
            maa_defaults: MaaDefaults::default(),
            maa_enabled,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_maa_defaults(mut self, defaults: MaaDefaults) -> Self {
        self.maa_defaults = defaults;
        self
    }

    /// Wire up the production pipeline from configuration.
    pub fn from_config(config: &AttestConfig, uvm: UvmInformation, simulate: bool) -> Result<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(config.timeout())?);
        let source: Arc<dyn ReportSource> = if simulate {
            Arc::new(SimulatedReportSource::default())
        } else {
            Arc::new(DeviceReportSource::from_config(config))
        };
        let context =
            AttestationContext::new(config.cert_cache.clone().unwrap_or_default(), &uvm)?;

        tracing::info!(
            endpoint_type = %context.endpoint.endpoint_type,
            cached_tcb = %format!("{:#x}", context.tcb),
            simulate,
            "Attestor initialised"
        );

        Ok(Self::new(
            source,
            Arc::new(CertChainProvider::new(http.clone())),
            MaaClient::new(http),
            context,
            uvm,
        )
        .with_retry(config.retry)
        .with_maa_defaults(config.maa.clone()))
    }

    /// Whether the token operation is available: a certificate endpoint is
    /// configured or the host supplied initial certificates.
    pub fn maa_enabled(&self) -> bool {
        self.maa_enabled
    }

    /// Authority address using the configured TEE type and API version.
    pub fn maa_endpoint(&self, endpoint: &str) -> MaaEndpoint {
        MaaEndpoint::new(endpoint, &self.maa_defaults)
    }

    /// Copy of the current context.
    pub async fn context(&self) -> AttestationContext {
        self.context.lock().await.clone()
    }

    pub async fn status(&self) -> AttestorStatus {
        let context = self.context.lock().await;
        AttestorStatus {
            maa_enabled: self.maa_enabled,
            endpoint_type: context.endpoint.endpoint_type.clone(),
            endpoint: context.endpoint.endpoint.clone(),
            cached_tcb: format!("{:#x}", context.tcb),
            cached_tcb_version: TcbVersion::from(context.tcb),
            max_attempts: self.retry.max_attempts,
        }
    }

    /// Fetch a report bound to `runtime_data` and return it as hex, with no
    /// chain reconciliation.
    pub async fn raw_attest(&self, runtime_data: &[u8]) -> Result<String> {
        let digest = runtime_data_digest(runtime_data);
        let raw = self.source.fetch_report(&digest).await?;
        Ok(hex::encode(raw))
    }

    /// Fetch a report and a chain that endorses its TCB.
    ///
    /// The first report is fetched before the context lock is taken. The
    /// lock is then held for comparison, refreshes and any re-fetch, so
    /// concurrent callers see each other's refreshes and never interleave
    /// them.
    pub async fn collect_evidence(&self, runtime_data: &[u8]) -> Result<Evidence> {
        let digest = runtime_data_digest(runtime_data);
        let (mut raw, mut report) = self.fetch_report(&digest).await?;

        let mut context = self.context.lock().await;
        if context.endorses(report.reported_tcb) {
            tracing::debug!(
                reported_tcb = %format!("{:#x}", report.reported_tcb),
                "Report TCB matches cached chain"
            );
            return Ok(Evidence {
                raw,
                report,
                cert_chain: context.cert_chain.clone(),
            });
        }

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                (raw, report) = self.fetch_report(&digest).await?;
                if context.endorses(report.reported_tcb) {
                    break;
                }
            }

            tracing::warn!(
                attempt,
                chip_id = %report.chip_id,
                reported_tcb = %format!("{:#x}", report.reported_tcb),
                cached_tcb = %format!("{:#x}", context.tcb),
                "Report TCB differs from cached chain, refreshing"
            );

            let refreshed = self
                .certs
                .get_cert_chain(&context.endpoint, &report.chip_id, report.reported_tcb)
                .await?;
            context.tcb = refreshed.tcb;
            context.cert_chain = refreshed.chain;

            if context.endorses(report.reported_tcb) {
                break;
            }
        }

        if !context.endorses(report.reported_tcb) {
            tracing::warn!(
                reported_tcb = %format!("{:#x}", report.reported_tcb),
                chain_tcb = %format!("{:#x}", context.tcb),
                max_attempts = self.retry.max_attempts,
                "Report and certificate chain TCB still disagree"
            );
            return Err(AttestError::Consistency {
                report_tcb: report.reported_tcb,
                chain_tcb: context.tcb,
            });
        }

        tracing::info!(
            reported_tcb = %format!("{:#x}", report.reported_tcb),
            "Certificate chain reconciled with report"
        );
        Ok(Evidence {
            raw,
            report,
            cert_chain: context.cert_chain.clone(),
        })
    }

    /// Collect reconciled evidence and exchange it for a token.
    pub async fn attest_maa(&self, maa: &MaaEndpoint, runtime_data: &[u8]) -> Result<String> {
        if !self.maa_enabled {
            return Err(AttestError::NotConfigured(
                "neither a certificate endpoint nor initial certificates are available".to_string(),
            ));
        }

        let reference_info = self.uvm.reference_info()?;
        let policy = self.uvm.security_policy()?;

        let evidence = self.collect_evidence(runtime_data).await?;
        let request = MaaRequest::build(
            &evidence.raw,
            &evidence.cert_chain,
            &policy,
            runtime_data,
            &reference_info,
        )?;
        self.maa.attest(maa, &request).await
    }

    async fn fetch_report(&self, digest: &RuntimeDigest) -> Result<(Vec<u8>, SnpReport)> {
        let raw = self.source.fetch_report(digest).await?;
        let report = SnpReport::from_bytes(&raw)?;
        Ok((raw, report))
    }
}
