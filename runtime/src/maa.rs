//! Attestation token request assembly and submission.
//!
//! The authority expects the evidence bundle as base64url JSON nested
//! inside the request's `report` field. Every base64 encoding here uses the
//! URL-safe alphabet with padding.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};

use cvm_attest_core::error::{AttestError, Result};
use cvm_attest_core::MaaDefaults;

use crate::http::HttpClient;

/// Attestation authority address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaaEndpoint {
    /// Host name (and optional path prefix), without scheme.
    pub endpoint: String,
    pub tee_type: String,
    /// Query string, e.g. `api-version=2020-10-01`.
    pub api_version: String,
}

impl MaaEndpoint {
    pub fn new(endpoint: impl Into<String>, defaults: &MaaDefaults) -> Self {
        Self {
            endpoint: endpoint.into(),
            tee_type: defaults.tee_type.clone(),
            api_version: defaults.api_version.clone(),
        }
    }

    /// `https://{endpoint}/attest/{tee_type}?{api_version}`
    pub fn attest_url(&self) -> String {
        format!(
            "https://{}/attest/{}?{}",
            self.endpoint, self.tee_type, self.api_version
        )
    }
}

/// Evidence bundle carried (base64url JSON) in [`MaaRequest::report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    #[serde(rename = "SnpReport")]
    pub snp_report: String,
    #[serde(rename = "VcekCertChain")]
    pub vcek_cert_chain: String,
    #[serde(rename = "Endorsements")]
    pub endorsements: String,
}

#[derive(Debug, Serialize)]
struct Endorsements {
    #[serde(rename = "Uvm")]
    uvm: Vec<String>,
}

/// Claims blob submitted alongside the evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsData {
    pub data: String,
    #[serde(rename = "dataType")]
    pub data_type: String,
}

/// Request body for `POST /attest/{tee_type}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaaRequest {
    pub report: String,
    #[serde(rename = "runtimeData")]
    pub runtime_data: ClaimsData,
    #[serde(rename = "initTimeData", skip_serializing_if = "Option::is_none", default)]
    pub init_time_data: Option<ClaimsData>,
    pub nonce: u64,
}

impl MaaRequest {
    /// Assemble a request.
    ///
    /// `key_blob` is always sent as runtime data. `policy_blob` is accepted
    /// but not transmitted, see [`init_time_data`].
    pub fn build(
        report: &[u8],
        chain: &[u8],
        policy_blob: &[u8],
        key_blob: &[u8],
        reference_info: &[u8],
    ) -> Result<Self> {
        let endorsements = serde_json::to_vec(&Endorsements {
            uvm: vec![URL_SAFE.encode(reference_info)],
        })
        .map_err(|e| AttestError::Encoding(format!("marshalling endorsements failed: {}", e)))?;

        let bundle = EvidenceBundle {
            snp_report: URL_SAFE.encode(report),
            vcek_cert_chain: URL_SAFE.encode(chain),
            endorsements: URL_SAFE.encode(endorsements),
        };
        let bundle_json = serde_json::to_vec(&bundle)
            .map_err(|e| AttestError::Encoding(format!("marshalling evidence failed: {}", e)))?;

        Ok(Self {
            report: URL_SAFE.encode(bundle_json),
            runtime_data: ClaimsData {
                data: URL_SAFE.encode(key_blob),
                data_type: "JSON".to_string(),
            },
            init_time_data: init_time_data(policy_blob),
            nonce: rand::random::<u64>(),
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AttestError::Encoding(format!("marshalling maa request failed: {}", e)))
    }
}

/// Init-time claims for the request.
///
/// Always `None`: the security policy is Rego text, which the authority
/// does not accept under any of its `dataType` encodings. Kept as a seam so
/// enabling it is a one-line change once a compatible encoding exists.
pub fn init_time_data(policy_blob: &[u8]) -> Option<ClaimsData> {
    tracing::debug!(
        policy_bytes = policy_blob.len(),
        "Init-time data not sent to attestation authority"
    );
    None
}

/// Field names the authority has used for the issued token.
const TOKEN_FIELDS: [&str; 2] = ["token", "Token"];

/// First non-empty token field of a JSON response body.
fn token_from_body(body: &[u8]) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    TOKEN_FIELDS
        .iter()
        .filter_map(|field| value.get(field).and_then(serde_json::Value::as_str))
        .find(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(AttestError::EmptyToken)
}

/// Client for the attestation authority.
pub struct MaaClient {
    http: Arc<dyn HttpClient>,
}

impl MaaClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Submit `request` and return the issued token.
    pub async fn attest(&self, maa: &MaaEndpoint, request: &MaaRequest) -> Result<String> {
        let url = maa.attest_url();
        let body = request.to_json()?;
        tracing::info!(url = %url, bytes = body.len(), "Submitting attestation request");

        let response = self.http.post_json(&url, body).await?;
        if !response.is_ok() {
            tracing::warn!(url = %url, status = response.status, "Attestation authority rejected request");
            return Err(AttestError::RemoteRejected {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        token_from_body(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, ScriptedHttpClient};

    fn decode(s: &str) -> Vec<u8> {
        URL_SAFE.decode(s).unwrap()
    }

    fn endpoint() -> MaaEndpoint {
        MaaEndpoint::new("sharedeus.eus.attest.azure.net", &MaaDefaults::default())
    }

    #[test]
    fn test_attest_url() {
        assert_eq!(
            endpoint().attest_url(),
            "https://sharedeus.eus.attest.azure.net/attest/SevSnpVM?api-version=2020-10-01"
        );
    }

    #[test]
    fn test_build_nests_evidence() {
        let request = MaaRequest::build(b"report", b"chain", b"policy", b"{\"k\":1}", b"refinfo").unwrap();

        let bundle: EvidenceBundle = serde_json::from_slice(&decode(&request.report)).unwrap();
        assert_eq!(decode(&bundle.snp_report), b"report");
        assert_eq!(decode(&bundle.vcek_cert_chain), b"chain");

        let endorsements: serde_json::Value =
            serde_json::from_slice(&decode(&bundle.endorsements)).unwrap();
        let uvm = endorsements["Uvm"].as_array().unwrap();
        assert_eq!(uvm.len(), 1);
        assert_eq!(decode(uvm[0].as_str().unwrap()), b"refinfo");

        assert_eq!(decode(&request.runtime_data.data), b"{\"k\":1}");
        assert_eq!(request.runtime_data.data_type, "JSON");
    }

    #[test]
    fn test_build_uses_url_safe_alphabet() {
        let request = MaaRequest::build(&[0xfb, 0xff], b"", b"", &[0xfb, 0xff], b"").unwrap();
        assert_eq!(request.runtime_data.data, "-_8=");
    }

    #[test]
    fn test_init_time_data_is_never_sent() {
        let request = MaaRequest::build(b"r", b"c", b"package policy", b"k", b"i").unwrap();
        assert!(request.init_time_data.is_none());
        let json: serde_json::Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        assert!(json.get("initTimeData").is_none());
        assert!(json.get("runtimeData").is_some());
        assert!(json["nonce"].is_u64());
    }

    #[test]
    fn test_nonce_differs_between_builds() {
        let a = MaaRequest::build(b"r", b"c", b"p", b"k", b"i").unwrap();
        let b = MaaRequest::build(b"r", b"c", b"p", b"k", b"i").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(a.report, b.report);
        assert_eq!(a.runtime_data, b.runtime_data);
    }

    #[tokio::test]
    async fn test_attest_returns_token() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_ok(r#"{"token":"eyJhbGciOi.payload.sig"}"#);
        let client = MaaClient::new(http.clone());
        let request = MaaRequest::build(b"r", b"c", b"p", b"k", b"i").unwrap();

        let token = client.attest(&endpoint(), &request).await.unwrap();
        assert_eq!(token, "eyJhbGciOi.payload.sig");

        let sent = &http.requests()[0];
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.url, endpoint().attest_url());
        let body: MaaRequest = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, request);
    }

    #[tokio::test]
    async fn test_attest_accepts_capitalised_field() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_ok(r#"{"Token":"abc"}"#);
        let client = MaaClient::new(http);
        let request = MaaRequest::build(b"r", b"c", b"p", b"k", b"i").unwrap();
        assert_eq!(client.attest(&endpoint(), &request).await.unwrap(), "abc");
    }

    #[test]
    fn test_token_from_body_takes_first_non_empty_field() {
        assert_eq!(
            token_from_body(br#"{"Token":"abc","token":""}"#).unwrap(),
            "abc"
        );
        assert_eq!(
            token_from_body(br#"{"token":"lower","Token":"upper"}"#).unwrap(),
            "lower"
        );
        assert!(matches!(
            token_from_body(br#"{"token":42}"#),
            Err(AttestError::EmptyToken)
        ));
        assert!(matches!(
            token_from_body(b"[]"),
            Err(AttestError::EmptyToken)
        ));
    }

    #[tokio::test]
    async fn test_attest_rejected_status() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(Ok(HttpResponse::new(400, "bad evidence")));
        let client = MaaClient::new(http);
        let request = MaaRequest::build(b"r", b"c", b"p", b"k", b"i").unwrap();
        match client.attest(&endpoint(), &request).await {
            Err(AttestError::RemoteRejected { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad evidence");
            }
            other => panic!("expected RemoteRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attest_empty_token() {
        for body in [r#"{"token":""}"#, r#"{}"#] {
            let http = Arc::new(ScriptedHttpClient::new());
            http.push_ok(body);
            let client = MaaClient::new(http);
            let request = MaaRequest::build(b"r", b"c", b"p", b"k", b"i").unwrap();
            assert!(matches!(
                client.attest(&endpoint(), &request).await,
                Err(AttestError::EmptyToken)
            ));
        }
    }

    #[tokio::test]
    async fn test_attest_malformed_response() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_ok("<html>");
        let client = MaaClient::new(http);
        let request = MaaRequest::build(b"r", b"c", b"p", b"k", b"i").unwrap();
        assert!(matches!(
            client.attest(&endpoint(), &request).await,
            Err(AttestError::Decode(_))
        ));
    }
}
