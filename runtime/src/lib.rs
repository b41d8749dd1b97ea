//! CVM Attest Runtime - SEV-SNP evidence and token exchange.
//!
//! This crate fetches hardware attestation reports, reconciles them with a
//! VCEK certificate chain endorsing the same TCB, and exchanges the pair
//! for a token from a remote attestation authority.

#![allow(clippy::result_large_err)]

pub mod attest;
pub mod certs;
pub mod http;
pub mod maa;
pub mod report;
pub mod simulate;
pub mod source;
pub mod tcb;

// Re-export common types
pub use attest::{AttestationContext, Attestor, AttestorStatus, Evidence};
pub use certs::{CertChainProvider, CertChainResponse, CertChainSource, EndpointKind};
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient, ScriptedHttpClient};
pub use maa::{MaaClient, MaaEndpoint, MaaRequest};
pub use report::{FieldDescriptor, FieldKind, SnpReport, REPORT_LAYOUT, SNP_REPORT_SIZE};
pub use simulate::{is_simulate_mode, SimulatedReportSource};
pub use source::{runtime_data_digest, DeviceReportSource, FixtureReportSource, ReportSource};
pub use tcb::TcbVersion;

/// CVM Attest Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
