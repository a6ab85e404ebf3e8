//! End to end identity generation and verification.
//!
//! Verification runs `parse-cert → extract-quote → verify-quote →
//! verify-pubkey-hash → verify-measurement` and stops at the first failure
//! with a single [`RejectReason`].

use std::time::Duration;

use p256::ecdsa::SigningKey;
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use tracing::{error, info, warn};
use x509_cert::der::Encode;
use x509_cert::Certificate;

use crate::binder::CertificateBinder;
use crate::error::{ErrorKind, GenError, RejectReason, Stage};
use crate::generator::{QuoteGenerator, QuotingBackend};
use crate::measurement::{MeasurementPolicy, UnimplementedPolicy};
use crate::types::quote::DcapQuote;
use crate::types::{Measurement, PublicKeyHash, Quote, ReportDataBinding, VerificationResult};
use crate::verifier::{QuoteVerifierLocal, RemoteAttestationClient, VerificationLibrary};

const DEFAULT_SUBJECT: &str = "CN=RA-TLS,O=tdx-ratls";
const DEFAULT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 3600);

/// A fresh key pair and the certificate binding it to a quote.
pub struct Identity {
    pub private_key: SigningKey,
    pub certificate: Certificate,
}

impl Identity {
    pub fn certificate_der(&self) -> Result<Vec<u8>, GenError> {
        self.certificate
            .to_der()
            .map_err(|e| GenError::Certificate(e.to_string()))
    }

    pub fn certificate_pem(&self) -> Result<String, GenError> {
        Ok(pem::encode(&pem::Pem::new("CERTIFICATE", self.certificate_der()?)))
    }

    pub fn private_key_pem(&self) -> Result<String, GenError> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.as_str().to_owned())
            .map_err(|e| GenError::Certificate(e.to_string()))
    }
}

/// Issues attested identities.
pub struct Attester<B> {
    generator: QuoteGenerator<B>,
    subject: String,
    validity: Duration,
}

impl<B: QuotingBackend> Attester<B> {
    pub fn new(backend: B) -> Self {
        Self {
            generator: QuoteGenerator::new(backend),
            subject: DEFAULT_SUBJECT.to_string(),
            validity: DEFAULT_VALIDITY,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Binding verifiers of these identities must be configured with.
    pub fn binding(&self) -> ReportDataBinding {
        self.generator.binding()
    }

    pub fn generate_identity(&self) -> Result<Identity, GenError> {
        let private_key = SigningKey::random(&mut OsRng);
        let hash = CertificateBinder::hash_for_key(&private_key)?;
        let quote = self.generator.generate(Some(&hash))?;

        let binder = CertificateBinder::new(self.binding());
        let certificate =
            binder.build_certificate(&private_key, &quote, &self.subject, self.validity)?;
        info!(hash = %hash, quote_len = quote.len(), "generated attested identity");
        Ok(Identity {
            private_key,
            certificate,
        })
    }
}

/// Where quotes are verified.
pub enum QuoteVerifier {
    Local(QuoteVerifierLocal<Box<dyn VerificationLibrary>>),
    Remote(RemoteAttestationClient),
}

impl QuoteVerifier {
    pub fn local(library: impl VerificationLibrary + 'static) -> Self {
        let library: Box<dyn VerificationLibrary> = Box::new(library);
        Self::Local(QuoteVerifierLocal::new(library))
    }

    pub fn remote(client: RemoteAttestationClient) -> Self {
        Self::Remote(client)
    }
}

/// Whether the certificate key must match the hash recovered from evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PubkeyHashCheck {
    #[default]
    Enforce,
    /// For backends that cannot bind the key into the evidence. Logged on
    /// every verification.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementCheck {
    #[default]
    Skip,
    Enforce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifierPolicy {
    pub pubkey_hash: PubkeyHashCheck,
    pub measurement: MeasurementCheck,
    /// Accept `TrustedWithWarning` quotes instead of rejecting them.
    pub accept_warnings: bool,
}

/// A verified peer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub result: VerificationResult,
    pub pubkey_hash: PublicKeyHash,
    pub measurement: Option<Measurement>,
}

pub struct IdentityVerifier {
    binder: CertificateBinder,
    verifier: QuoteVerifier,
    policy: VerifierPolicy,
    measurement_policy: Box<dyn MeasurementPolicy>,
}

impl IdentityVerifier {
    pub fn new(binding: ReportDataBinding, verifier: QuoteVerifier) -> Self {
        Self {
            binder: CertificateBinder::new(binding),
            verifier,
            policy: VerifierPolicy::default(),
            measurement_policy: Box::new(UnimplementedPolicy),
        }
    }

    pub fn with_policy(mut self, policy: VerifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_measurement_policy(mut self, policy: impl MeasurementPolicy + 'static) -> Self {
        self.measurement_policy = Box::new(policy);
        self
    }

    /// Verify a peer certificate (PEM or DER).
    pub fn verify_identity(&self, cert: &[u8]) -> Result<Accepted, RejectReason> {
        let accepted = self.run(cert).map_err(|reason| {
            error!(stage = %reason.stage, kind = %reason.kind, detail = %reason.detail, "identity rejected");
            reason
        })?;
        info!(result = ?accepted.result, hash = %accepted.pubkey_hash, "identity accepted");
        Ok(accepted)
    }

    fn run(&self, cert: &[u8]) -> Result<Accepted, RejectReason> {
        let cert = self
            .binder
            .parse_certificate(cert)
            .map_err(|e| RejectReason::new(Stage::ParseCert, e.kind(), e.to_string()))?;

        let quote = self
            .binder
            .extract(&cert)
            .map_err(|e| RejectReason::new(Stage::ExtractQuote, e.kind(), e.to_string()))?;

        let (result, remote_hash) = self.verify_quote(&quote)?;

        let cert_hash = self
            .binder
            .compute_pubkey_hash(&cert)
            .map_err(|e| RejectReason::new(Stage::VerifyPubkeyHash, e.kind(), e.to_string()))?;
        match self.policy.pubkey_hash {
            PubkeyHashCheck::Enforce => {
                let evidence_hash = match remote_hash {
                    Some(hash) => hash,
                    None => self.binder.hash_from_evidence(&quote).map_err(|e| {
                        RejectReason::new(Stage::VerifyPubkeyHash, e.kind(), e.to_string())
                    })?,
                };
                if !self.binder.check(&evidence_hash, &cert_hash) {
                    return Err(RejectReason::new(
                        Stage::VerifyPubkeyHash,
                        ErrorKind::HashMismatch,
                        format!("evidence carries {evidence_hash}, certificate key is {cert_hash}"),
                    ));
                }
            }
            PubkeyHashCheck::Disabled => {
                warn!(hash = %cert_hash, "public key hash check disabled, certificate key is not bound to the quote");
            }
        }

        let measurement = match self.policy.measurement {
            MeasurementCheck::Skip => None,
            MeasurementCheck::Enforce => {
                let measurement = DcapQuote::parse(quote.evidence())
                    .map(|parsed| parsed.measurement())
                    .map_err(|e| {
                        RejectReason::new(Stage::VerifyMeasurement, ErrorKind::NoQuote, format!("{e:#}"))
                    })?;
                self.measurement_policy
                    .check(&measurement)
                    .map_err(|e| RejectReason::new(Stage::VerifyMeasurement, e.kind(), e.to_string()))?;
                Some(measurement)
            }
        };

        Ok(Accepted {
            result,
            pubkey_hash: cert_hash,
            measurement,
        })
    }

    fn verify_quote(
        &self,
        quote: &Quote,
    ) -> Result<(VerificationResult, Option<PublicKeyHash>), RejectReason> {
        let reject = |kind: ErrorKind, detail: String| RejectReason::new(Stage::VerifyQuote, kind, detail);

        let (result, remote_hash) = match &self.verifier {
            QuoteVerifier::Local(local) => {
                let result = local.verify(quote).map_err(|e| reject(e.kind(), e.to_string()))?;
                (result, None)
            }
            QuoteVerifier::Remote(remote) => {
                let (result, hash) = remote.verify(quote).map_err(|e| reject(e.kind(), e.to_string()))?;
                (result, Some(hash))
            }
        };

        match result {
            VerificationResult::Rejected => Err(reject(
                ErrorKind::QuoteRejected,
                "quote verification returned Rejected".into(),
            )),
            VerificationResult::TrustedWithWarning if !self.policy.accept_warnings => Err(reject(
                ErrorKind::AdvisoryStatus,
                "quote is valid but carries advisories or stale collateral".into(),
            )),
            VerificationResult::TrustedWithWarning => {
                warn!("accepting quote with advisory status");
                Ok((result, remote_hash))
            }
            VerificationResult::Trusted => Ok((result, remote_hash)),
        }
    }
}
