use thiserror::Error;

/// Attestation error types
#[derive(Error, Debug)]
pub enum AttestError {
    /// Binary report buffer has the wrong size or shape
    #[error("Report format error: {0}")]
    Format(String),

    /// A structured value could not be encoded back to bytes
    #[error("Encode error: {field} - {reason}")]
    Encode { field: String, reason: String },

    /// Malformed hex, base64, PEM or JSON input
    #[error("Decode error: {0}")]
    Decode(String),

    /// No attestation-capable device is present
    #[error("Attestation device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The evidence provider failed or produced unusable output
    #[error("Report source error: {0}")]
    Source(String),

    /// HTTP-layer failure talking to a certificate endpoint or the authority
    #[error("Transport error: {0}")]
    Transport(String),

    /// Certificate endpoint type is not one of AMD, AzCache, LocalTHIM
    #[error("Unsupported certificate endpoint type: {0}")]
    UnsupportedEndpoint(String),

    /// Certificate endpoint has no URL
    #[error("Certificate endpoint not configured: {0}")]
    NotConfigured(String),

    /// No VCEK leaf certificate in the chain
    #[error("No VCEK leaf certificate found in certificate chain")]
    NoLeafCertificate,

    /// Certificate DER or extension could not be parsed
    #[error("Certificate parse error: {0}")]
    CertParse(String),

    /// Report and certificate chain disagree on the TCB after bounded retry
    #[error("SNP reported TCB value: {report_tcb:#x} doesn't match certificate TCB value: {chain_tcb:#x}")]
    Consistency { report_tcb: u64, chain_tcb: u64 },

    /// The attestation authority answered with a non-200 status
    #[error("Attestation authority rejected request: HTTP {status}")]
    RemoteRejected { status: u16, message: String },

    /// The attestation authority answered without a token
    #[error("Empty token string in attestation authority response")]
    EmptyToken,

    /// Building the attestation request payload failed
    #[error("Request encoding error: {0}")]
    Encoding(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AttestError {
    fn from(err: serde_json::Error) -> Self {
        AttestError::Decode(err.to_string())
    }
}

impl From<serde_yaml::Error> for AttestError {
    fn from(err: serde_yaml::Error) -> Self {
        AttestError::Decode(err.to_string())
    }
}

/// Result type alias for attestation operations
pub type Result<T> = std::result::Result<T, AttestError>;
