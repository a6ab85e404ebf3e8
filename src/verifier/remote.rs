//! Quote verification through a remote attestation service.
//!
//! The quote is posted to the provider's attest endpoint, the service answers
//! with a signed token, and the public key hash is read back from the
//! provider's report data claim.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{AttestationServiceConfig, RequestShape};
use crate::constants::DEFAULT_ATTESTATION_CONFIG_PATH;
use crate::error::VerifyError;
use crate::transport::{BlockingHttpTransport, HttpTransport};
use crate::types::{PublicKeyHash, Quote, VerificationResult};
use crate::utils::encoding::{b64_decode_any, b64url_encode};
use crate::utils::hex_preview;
use crate::verifier::token::{JwksVerifier, Token, TokenVerifier, UnverifiedTokens};

/// Runtime data sent with every request. User claims from the config are not
/// forwarded yet.
const PLACEHOLDER_CLAIMS: &[u8] = b"{}";

pub struct RemoteAttestationClient {
    config_path: PathBuf,
    transport: Option<Arc<dyn HttpTransport>>,
    token_verifier: Option<Arc<dyn TokenVerifier>>,
}

impl Default for RemoteAttestationClient {
    fn default() -> Self {
        Self::with_config_path(DEFAULT_ATTESTATION_CONFIG_PATH)
    }
}

impl RemoteAttestationClient {
    pub fn with_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            transport: None,
            token_verifier: None,
        }
    }

    /// Use `transport` instead of a `reqwest` client built from the config.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use `verifier` instead of the provider's JWKS endpoint.
    pub fn with_token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.token_verifier = Some(verifier);
        self
    }

    /// Load the configuration, then verify. Nothing goes on the wire unless the
    /// configuration is complete.
    pub fn verify(&self, quote: &Quote) -> Result<(VerificationResult, PublicKeyHash), VerifyError> {
        let config = AttestationServiceConfig::load(&self.config_path).map_err(|e| {
            error!(path = %self.config_path.display(), error = %e, "attestation config rejected");
            e
        })?;
        self.verify_with_config(&config, quote)
    }

    pub fn verify_with_config(
        &self,
        config: &AttestationServiceConfig,
        quote: &Quote,
    ) -> Result<(VerificationResult, PublicKeyHash), VerifyError> {
        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(BlockingHttpTransport::new(config.request_timeout)?),
        };
        let profile = config.profile;

        let start = Instant::now();
        let response = self.attest(config, transport.as_ref(), quote)?;
        let attest_elapsed = start.elapsed();

        let token = Token::split(&extract_token(&response)?)?;
        if config.verify_token_signature {
            let verifier: Arc<dyn TokenVerifier> = match &self.token_verifier {
                Some(verifier) => verifier.clone(),
                None => Arc::new(JwksVerifier::new(
                    transport.clone(),
                    config.token_signing_keys_url.clone(),
                )),
            };
            verifier.verify(&token)?;
        } else {
            warn!(provider = %config.provider, "token signature verification disabled by configuration");
            UnverifiedTokens.verify(&token)?;
        }

        let claims = token.claims()?;
        let encoded = claims
            .get(profile.report_data_claim)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VerifyError::MissingReportData(format!("claim {} absent", profile.report_data_claim))
            })?;
        let report_data = b64_decode_any(encoded).map_err(|e| {
            VerifyError::MissingReportData(format!("claim {} is not base64: {e}", profile.report_data_claim))
        })?;
        let digest_len = profile.hash_algorithm.digest_len();
        if report_data.len() < digest_len {
            return Err(VerifyError::MissingReportData(format!(
                "claim {} holds {} bytes, expected at least {digest_len}",
                profile.report_data_claim,
                report_data.len()
            )));
        }
        let hash = PublicKeyHash::from_prefix(&report_data).ok_or_else(|| {
            VerifyError::MissingReportData("report data shorter than a public key hash".into())
        })?;
        debug!(report_data = %hex_preview(&report_data, 64), hash = %hash, "recovered report data");

        let result = match profile.tcb_status_claim {
            Some(claim) => match claims.get(claim).and_then(Value::as_str) {
                Some(status) => map_tcb_status(status),
                None => {
                    warn!(claim, "token carries no TCB status");
                    VerificationResult::TrustedWithWarning
                }
            },
            None => VerificationResult::Trusted,
        };

        if config.enable_metrics {
            info!(
                provider = %config.provider,
                attest_ms = attest_elapsed.as_millis() as u64,
                total_ms = start.elapsed().as_millis() as u64,
                "remote attestation metrics"
            );
        }
        info!(provider = %config.provider, result = ?result, "remote attestation completed");
        Ok((result, hash))
    }

    fn attest(
        &self,
        config: &AttestationServiceConfig,
        transport: &dyn HttpTransport,
        quote: &Quote,
    ) -> Result<String, VerifyError> {
        let encoded_quote = b64url_encode(quote.evidence());
        let encoded_claims = b64url_encode(PLACEHOLDER_CLAIMS);

        let (body, api_key) = match config.profile.request_shape {
            RequestShape::Maa => (
                json!({
                    "quote": encoded_quote,
                    "runtimeData": { "data": encoded_claims, "dataType": "JSON" },
                }),
                None,
            ),
            RequestShape::Amber => (
                json!({ "quote": encoded_quote, "runtime_data": encoded_claims }),
                config.api_key.as_deref(),
            ),
        };
        let mut headers = vec![("Accept", "application/json")];
        if let Some(key) = api_key {
            headers.push(("x-api-key", key));
        }

        let url = config.attest_url();
        debug!(url = %url, quote_len = quote.evidence().len(), "submitting quote");
        transport.post_json(&url, &headers, &body).map_err(|e| {
            error!(url = %url, error = %e, "attestation request failed");
            VerifyError::from(e)
        })
    }
}

/// The service answers either `{"token": "..."}` or the bare token.
fn extract_token(response: &str) -> Result<String, VerifyError> {
    let response = response.trim();
    let token = if response.starts_with('{') {
        let value: Value = serde_json::from_str(response)
            .map_err(|e| VerifyError::MalformedToken(format!("response is not JSON: {e}")))?;
        value
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        response.trim_matches('"').to_string()
    };
    if token.trim().is_empty() {
        return Err(VerifyError::EmptyToken);
    }
    Ok(token)
}

fn map_tcb_status(status: &str) -> VerificationResult {
    match status {
        "OK" | "UpToDate" => VerificationResult::Trusted,
        "SWHardeningNeeded"
        | "ConfigurationNeeded"
        | "ConfigurationAndSWHardeningNeeded"
        | "OutOfDate"
        | "OutOfDateConfigurationNeeded" => VerificationResult::TrustedWithWarning,
        other => {
            error!(status = other, "platform TCB not trusted");
            VerificationResult::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use crate::testing::MockTransport;
    use std::io::Write;

    struct AcceptAll;

    impl TokenVerifier for AcceptAll {
        fn verify(&self, _: &Token) -> Result<(), VerifyError> {
            Ok(())
        }
    }

    struct RejectAll;

    impl TokenVerifier for RejectAll {
        fn verify(&self, _: &Token) -> Result<(), VerifyError> {
            Err(VerifyError::UntrustedToken("test".into()))
        }
    }

    fn token_with(claims: Value) -> String {
        format!(
            "{}.{}.c2ln",
            b64url_encode(br#"{"alg":"RS256"}"#),
            b64url_encode(claims.to_string().as_bytes())
        )
    }

    fn config_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    fn client(file: &tempfile::NamedTempFile, transport: Arc<MockTransport>) -> RemoteAttestationClient {
        RemoteAttestationClient::with_config_path(file.path())
            .with_transport(transport)
            .with_token_verifier(Arc::new(AcceptAll))
    }

    fn quote() -> Quote {
        Quote::new(vec![0xab; 64])
    }

    const MAA: &str = r#"{"attestation_url": "https://maa.example", "attestation_provider": "maa"}"#;
    const AMBER: &str = r#"{"attestation_url": "https://amber.example", "attestation_provider": "amber", "api_key": "k"}"#;

    #[test]
    fn maa_report_data_yields_hash() {
        let hash = [0x3c; 32];
        let token = token_with(json!({ "tdx_report_data": base64ct_standard(&hash) }));
        let transport = Arc::new(MockTransport::responding(Ok(json!({ "token": token }).to_string())));
        let file = config_file(MAA);

        let (result, recovered) = client(&file, transport.clone()).verify(&quote()).unwrap();
        assert_eq!(result, VerificationResult::Trusted);
        assert_eq!(recovered, PublicKeyHash(hash));

        let (url, headers, body) = transport.last_request().unwrap();
        assert_eq!(url, "https://maa.example/attest/TdxVm?api-version=2023-04-01-preview");
        assert!(headers.iter().all(|(name, _)| name != "x-api-key"));
        assert_eq!(body["quote"], b64url_encode(&[0xab; 64]));
        assert_eq!(body["runtimeData"]["data"], "e30");
        assert_eq!(body["runtimeData"]["dataType"], "JSON");
    }

    #[test]
    fn amber_sends_api_key_and_maps_tcb_status() {
        let report_data = [0x77; 64];
        let token = token_with(json!({
            "amber_report_data": b64url_encode(&report_data),
            "attester_tcb_status": "OutOfDate",
        }));
        let transport = Arc::new(MockTransport::responding(Ok(token)));
        let file = config_file(AMBER);

        let (result, recovered) = client(&file, transport.clone()).verify(&quote()).unwrap();
        assert_eq!(result, VerificationResult::TrustedWithWarning);
        assert_eq!(recovered, PublicKeyHash([0x77; 32]));

        let (url, headers, body) = transport.last_request().unwrap();
        assert_eq!(url, "https://amber.example/appraisal/v1/attest");
        assert!(headers.contains(&("x-api-key".to_string(), "k".to_string())));
        assert_eq!(body["runtime_data"], "e30");
    }

    #[test]
    fn amber_report_data_must_cover_sha512() {
        let token = token_with(json!({ "amber_report_data": b64url_encode(&[1u8; 32]) }));
        let transport = Arc::new(MockTransport::responding(Ok(token)));
        let file = config_file(AMBER);
        let err = client(&file, transport).verify(&quote()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingReportData);
    }

    #[test]
    fn amber_without_api_key_makes_no_call() {
        let transport = Arc::new(MockTransport::responding(Ok(token_with(json!({
            "amber_report_data": b64url_encode(&[0u8; 64]),
        })))));
        let file = config_file(
            r#"{"attestation_url": "https://amber.example", "attestation_provider": "AMBER", "api_key": ""}"#,
        );

        let err = client(&file, transport.clone()).verify(&quote()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingCredential);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn missing_provider_makes_no_call() {
        let transport = Arc::new(MockTransport::responding(Ok(String::new())));
        let file = config_file(r#"{"attestation_url": "https://maa.example"}"#);

        let err = client(&file, transport.clone()).verify(&quote()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn missing_claim_is_missing_report_data() {
        let transport = Arc::new(MockTransport::responding(Ok(token_with(json!({ "x": 1 })))));
        let file = config_file(MAA);
        let err = client(&file, transport).verify(&quote()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingReportData);
    }

    #[test]
    fn empty_and_malformed_tokens() {
        let file = config_file(MAA);
        for (response, kind) in [
            ("", ErrorKind::EmptyToken),
            (r#"{"token": ""}"#, ErrorKind::EmptyToken),
            (r#"{"other": "x"}"#, ErrorKind::EmptyToken),
            ("only.two", ErrorKind::MalformedToken),
            ("a.b.c.d", ErrorKind::MalformedToken),
        ] {
            let transport = Arc::new(MockTransport::responding(Ok(response.to_string())));
            let err = client(&file, transport).verify(&quote()).unwrap_err();
            assert_eq!(err.kind(), kind, "{response}");
        }
    }

    #[test]
    fn untrusted_token_is_rejected_before_claims() {
        let token = token_with(json!({ "tdx_report_data": b64url_encode(&[0u8; 32]) }));
        let transport = Arc::new(MockTransport::responding(Ok(token)));
        let file = config_file(MAA);
        let err = RemoteAttestationClient::with_config_path(file.path())
            .with_transport(transport)
            .with_token_verifier(Arc::new(RejectAll))
            .verify(&quote())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UntrustedToken);
    }

    #[test]
    fn signature_check_can_be_disabled() {
        let token = token_with(json!({ "tdx_report_data": b64url_encode(&[4u8; 32]) }));
        let transport = Arc::new(MockTransport::responding(Ok(token)));
        let file = config_file(
            r#"{"attestation_url": "https://maa.example", "attestation_provider": "maa",
                "verify_token_signature": false}"#,
        );
        let (_, hash) = RemoteAttestationClient::with_config_path(file.path())
            .with_transport(transport.clone())
            .with_token_verifier(Arc::new(RejectAll))
            .verify(&quote())
            .unwrap();
        assert_eq!(hash, PublicKeyHash([4u8; 32]));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn transport_errors_map_through() {
        let file = config_file(MAA);
        let transport = Arc::new(MockTransport::responding(Err(TransportError::Timeout)));
        let err = client(&file, transport).verify(&quote()).unwrap_err();
        assert_eq!(err, VerifyError::Timeout);
    }

    #[test]
    fn trailer_is_not_submitted() {
        let token = token_with(json!({ "tdx_report_data": b64url_encode(&[0u8; 32]) }));
        let transport = Arc::new(MockTransport::responding(Ok(token)));
        let file = config_file(MAA);
        let quote = Quote::with_appended_hash(vec![0xab; 64], &PublicKeyHash([9; 32]));
        client(&file, transport.clone()).verify(&quote).unwrap();
        let (_, _, body) = transport.last_request().unwrap();
        assert_eq!(body["quote"], b64url_encode(&[0xab; 64]));
    }

    #[test]
    fn tcb_status_mapping() {
        assert_eq!(map_tcb_status("OK"), VerificationResult::Trusted);
        assert_eq!(map_tcb_status("SWHardeningNeeded"), VerificationResult::TrustedWithWarning);
        assert_eq!(map_tcb_status("Revoked"), VerificationResult::Rejected);
        assert_eq!(map_tcb_status("whatever"), VerificationResult::Rejected);
    }

    fn base64ct_standard(bytes: &[u8]) -> String {
        use base64ct::{Base64, Encoding};
        Base64::encode_string(bytes)
    }
}
