//! CVM Attest Core - Foundational Types
//!
//! Error taxonomy, configuration and UVM security-context loading shared
//! by the attestation runtime and its command-line surface.

pub mod config;
pub mod error;
pub mod uvm;

// Re-export commonly used types
pub use config::{AttestConfig, CertEndpointConfig, MaaDefaults, RetryPolicy};
pub use error::{AttestError, Result};
pub use uvm::{discover_security_context_dir, ThimCerts, UvmInformation};

/// CVM Attest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
