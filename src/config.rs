//! Remote attestation service configuration.
//!
//! The JSON file is deserialized into an all-optional [`RawConfig`] and then
//! validated, so a bad provider or a missing credential surfaces at load time
//! with a typed error instead of at the first network call.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{DEFAULT_REQUEST_TIMEOUT_SECS, SHA256_DIGEST_LEN, SHA512_DIGEST_LEN};
use crate::error::VerifyError;

/// Attestation service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Microsoft Azure Attestation.
    Maa,
    /// Intel Trust Authority (formerly Project Amber).
    Amber,
}

impl FromStr for Provider {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "maa" => Ok(Self::Maa),
            "amber" => Ok(Self::Amber),
            other => Err(VerifyError::ConfigInvalid(format!(
                "unknown attestation_provider {other:?}, expected \"maa\" or \"amber\""
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Maa => "maa",
            Self::Amber => "amber",
        })
    }
}

/// Digest the provider applies to runtime data before echoing it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => SHA256_DIGEST_LEN,
            Self::Sha512 => SHA512_DIGEST_LEN,
        }
    }
}

/// Shape of the attest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// `{"quote", "runtimeData": {"data", "dataType": "JSON"}}`
    Maa,
    /// `{"quote", "runtime_data"}` with an `x-api-key` header.
    Amber,
}

/// Where a provider publishes its token signing key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetLocation {
    /// A path under the configured `attestation_url`.
    UnderAttestationUrl(&'static str),
    /// A fixed URL, independent of the attest API host.
    Fixed(&'static str),
}

impl KeySetLocation {
    pub fn resolve(self, attestation_url: &str) -> String {
        match self {
            Self::UnderAttestationUrl(path) => format!("{attestation_url}{path}"),
            Self::Fixed(url) => url.to_string(),
        }
    }
}

/// Everything that differs between providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    pub attest_path: &'static str,
    /// Claim that echoes the report data.
    pub report_data_claim: &'static str,
    pub hash_algorithm: HashAlgorithm,
    pub requires_api_key: bool,
    pub request_shape: RequestShape,
    /// Claim carrying the platform TCB verdict, if the provider emits one.
    pub tcb_status_claim: Option<&'static str>,
    /// Default token signing key set, overridden by `token_signing_keys_url`.
    pub key_set: KeySetLocation,
}

impl Provider {
    pub fn profile(self) -> ProviderProfile {
        match self {
            Self::Maa => ProviderProfile {
                attest_path: "/attest/TdxVm?api-version=2023-04-01-preview",
                report_data_claim: "tdx_report_data",
                hash_algorithm: HashAlgorithm::Sha256,
                requires_api_key: false,
                request_shape: RequestShape::Maa,
                tcb_status_claim: None,
                key_set: KeySetLocation::UnderAttestationUrl("/certs"),
            },
            Self::Amber => ProviderProfile {
                attest_path: "/appraisal/v1/attest",
                report_data_claim: "amber_report_data",
                hash_algorithm: HashAlgorithm::Sha512,
                requires_api_key: true,
                request_shape: RequestShape::Amber,
                tcb_status_claim: Some("attester_tcb_status"),
                key_set: KeySetLocation::Fixed("https://portal.trustauthority.intel.com/certs"),
            },
        }
    }
}

/// The configuration file as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub attestation_url: Option<String>,
    pub attestation_provider: Option<String>,
    pub api_key: Option<String>,
    pub enable_metrics: Option<bool>,
    pub claims: Option<serde_json::Value>,
    pub request_timeout_secs: Option<u64>,
    pub verify_token_signature: Option<bool>,
    pub token_signing_keys_url: Option<String>,
}

/// Validated remote attestation configuration. Read-only once loaded.
#[derive(Clone)]
pub struct AttestationServiceConfig {
    pub attestation_url: String,
    pub provider: Provider,
    pub profile: ProviderProfile,
    pub api_key: Option<String>,
    /// Only checked for presence and shape; the request carries `{}`.
    pub claims: Option<serde_json::Value>,
    pub enable_metrics: bool,
    pub request_timeout: Duration,
    pub verify_token_signature: bool,
    pub token_signing_keys_url: String,
}

impl fmt::Debug for AttestationServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationServiceConfig")
            .field("attestation_url", &self.attestation_url)
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("enable_metrics", &self.enable_metrics)
            .field("request_timeout", &self.request_timeout)
            .field("verify_token_signature", &self.verify_token_signature)
            .field("token_signing_keys_url", &self.token_signing_keys_url)
            .finish()
    }
}

impl AttestationServiceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::ConfigInvalid(format!("reading {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded attestation config");
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, VerifyError> {
        let raw: RawConfig = serde_json::from_str(content)
            .map_err(|e| VerifyError::ConfigInvalid(format!("parsing config: {e}")))?;
        Self::try_from(raw)
    }

    /// Full URL of the attest endpoint.
    pub fn attest_url(&self) -> String {
        format!("{}{}", self.attestation_url, self.profile.attest_path)
    }
}

impl TryFrom<RawConfig> for AttestationServiceConfig {
    type Error = VerifyError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let attestation_url = raw
            .attestation_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| VerifyError::ConfigInvalid("attestation_url is missing".into()))?;

        let provider: Provider = raw
            .attestation_provider
            .ok_or_else(|| VerifyError::ConfigInvalid("attestation_provider is missing".into()))?
            .parse()?;
        let profile = provider.profile();

        let api_key = raw.api_key.filter(|key| !key.trim().is_empty());
        if profile.requires_api_key && api_key.is_none() {
            return Err(VerifyError::MissingCredential(provider.to_string()));
        }

        let claims = raw.claims.filter(|claims| !claims.is_null());
        if let Some(claims) = &claims {
            if !claims.is_object() {
                return Err(VerifyError::ConfigInvalid("claims must be a JSON object".into()));
            }
        }

        let request_timeout_secs = raw.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if request_timeout_secs == 0 {
            return Err(VerifyError::ConfigInvalid("request_timeout_secs must be positive".into()));
        }

        let token_signing_keys_url = raw
            .token_signing_keys_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| profile.key_set.resolve(&attestation_url));

        Ok(Self {
            attestation_url,
            provider,
            profile,
            api_key,
            claims,
            enable_metrics: raw.enable_metrics.unwrap_or(false),
            request_timeout: Duration::from_secs(request_timeout_secs),
            verify_token_signature: raw.verify_token_signature.unwrap_or(true),
            token_signing_keys_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn loads_maa_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"attestation_url": "https://shared.eus.attest.azure.net/",
                 "attestation_provider": "MAA",
                 "enable_metrics": true}}"#
        )
        .unwrap();

        let config = AttestationServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.provider, Provider::Maa);
        assert_eq!(config.profile.report_data_claim, "tdx_report_data");
        assert_eq!(config.profile.hash_algorithm.digest_len(), 32);
        assert!(config.enable_metrics);
        assert!(config.verify_token_signature);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(
            config.attest_url(),
            "https://shared.eus.attest.azure.net/attest/TdxVm?api-version=2023-04-01-preview"
        );
        assert_eq!(config.token_signing_keys_url, "https://shared.eus.attest.azure.net/certs");
    }

    #[test]
    fn amber_needs_api_key() {
        let err = AttestationServiceConfig::from_json(
            r#"{"attestation_url": "https://api.trustauthority.intel.com",
                "attestation_provider": "amber", "api_key": ""}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingCredential);

        let config = AttestationServiceConfig::from_json(
            r#"{"attestation_url": "https://api.trustauthority.intel.com",
                "attestation_provider": "Amber", "api_key": "secret"}"#,
        )
        .unwrap();
        assert_eq!(config.profile.hash_algorithm, HashAlgorithm::Sha512);
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn default_key_set_follows_provider() {
        let config = AttestationServiceConfig::from_json(
            r#"{"attestation_url": "https://api.trustauthority.intel.com",
                "attestation_provider": "amber", "api_key": "secret"}"#,
        )
        .unwrap();
        assert_eq!(
            config.token_signing_keys_url,
            "https://portal.trustauthority.intel.com/certs"
        );

        let config = AttestationServiceConfig::from_json(
            r#"{"attestation_url": "https://api.trustauthority.intel.com",
                "attestation_provider": "amber", "api_key": "secret",
                "token_signing_keys_url": "https://keys.example/jwks"}"#,
        )
        .unwrap();
        assert_eq!(config.token_signing_keys_url, "https://keys.example/jwks");
    }

    #[test]
    fn missing_or_unknown_fields_are_invalid() {
        for json in [
            r#"{"attestation_url": "https://x"}"#,
            r#"{"attestation_provider": "maa"}"#,
            r#"{"attestation_url": "  ", "attestation_provider": "maa"}"#,
            r#"{"attestation_url": "https://x", "attestation_provider": "sgx"}"#,
            r#"{"attestation_url": "https://x", "attestation_provider": "maa", "claims": [1]}"#,
            r#"{"attestation_url": "https://x", "attestation_provider": "maa", "request_timeout_secs": 0}"#,
            "not json",
        ] {
            let err = AttestationServiceConfig::from_json(json).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigInvalid, "{json}");
        }
    }

    #[test]
    fn missing_file_is_invalid() {
        let err = AttestationServiceConfig::load("/nonexistent/ratls.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn optional_overrides() {
        let config = AttestationServiceConfig::from_json(
            r#"{"attestation_url": "https://x", "attestation_provider": "maa",
                "claims": {"nonce": "abc"}, "request_timeout_secs": 5,
                "verify_token_signature": false,
                "token_signing_keys_url": "https://keys.example/jwks"}"#,
        )
        .unwrap();
        assert!(config.claims.is_some());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.verify_token_signature);
        assert_eq!(config.token_signing_keys_url, "https://keys.example/jwks");
    }
}
