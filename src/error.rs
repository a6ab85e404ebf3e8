use std::fmt;

use thiserror::Error;

/// Error kinds surfaced to the embedding TLS layer.
///
/// Every component error maps onto exactly one kind so that a rejected
/// attempt carries a single, stable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigInvalid,
    MissingCredential,
    HardwareUnavailable,
    RemoteEvidenceEmpty,
    TransportError,
    EmptyToken,
    MalformedToken,
    UntrustedToken,
    MissingReportData,
    LibraryMismatch,
    CertificateInvalid,
    CertificateBuild,
    NoQuote,
    QuoteRejected,
    AdvisoryStatus,
    HashMismatch,
    MeasurementNotImplemented,
    MeasurementMismatch,
    Timeout,
}

impl ErrorKind {
    /// Network failures a caller may retry with backoff. Nothing in this crate
    /// retries on its own.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::TransportError | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("http transport failure: {0}")]
    Http(String),
}

/// Quote generation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenError {
    #[error("quoting primitive unavailable: {0}")]
    HardwareUnavailable(String),
    #[error("remote evidence endpoint returned an empty quote")]
    RemoteEvidenceEmpty,
    #[error("evidence transport failure: {0}")]
    TransportError(String),
    #[error("evidence request timed out")]
    Timeout,
    #[error("failed to build certificate: {0}")]
    Certificate(String),
}

impl GenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HardwareUnavailable(_) => ErrorKind::HardwareUnavailable,
            Self::RemoteEvidenceEmpty => ErrorKind::RemoteEvidenceEmpty,
            Self::TransportError(_) => ErrorKind::TransportError,
            Self::Timeout => ErrorKind::Timeout,
            Self::Certificate(_) => ErrorKind::CertificateBuild,
        }
    }
}

impl From<TransportError> for GenError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::Timeout,
            TransportError::Http(msg) => Self::TransportError(msg),
        }
    }
}

/// Quote verification errors, local and remote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("invalid attestation configuration: {0}")]
    ConfigInvalid(String),
    #[error("attestation provider {0} requires an api_key")]
    MissingCredential(String),
    #[error("attestation transport failure: {0}")]
    TransportError(String),
    #[error("attestation request timed out")]
    Timeout,
    #[error("attestation service returned an empty token")]
    EmptyToken,
    #[error("malformed attestation token: {0}")]
    MalformedToken(String),
    #[error("attestation token not trusted: {0}")]
    UntrustedToken(String),
    #[error("attestation token has no usable report data: {0}")]
    MissingReportData(String),
    #[error("quote verification library mismatch: {0}")]
    LibraryMismatch(String),
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            Self::MissingCredential(_) => ErrorKind::MissingCredential,
            Self::TransportError(_) => ErrorKind::TransportError,
            Self::Timeout => ErrorKind::Timeout,
            Self::EmptyToken => ErrorKind::EmptyToken,
            Self::MalformedToken(_) => ErrorKind::MalformedToken,
            Self::UntrustedToken(_) => ErrorKind::UntrustedToken,
            Self::MissingReportData(_) => ErrorKind::MissingReportData,
            Self::LibraryMismatch(_) => ErrorKind::LibraryMismatch,
        }
    }
}

impl From<TransportError> for VerifyError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::Timeout,
            TransportError::Http(msg) => Self::TransportError(msg),
        }
    }
}

/// Certificate binding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("invalid certificate: {0}")]
    CertificateInvalid(String),
    #[error("no quote in certificate: {0}")]
    NoQuote(String),
    #[error("public key hash does not match the attestation evidence")]
    HashMismatch,
}

impl BindError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CertificateInvalid(_) => ErrorKind::CertificateInvalid,
            Self::NoQuote(_) => ErrorKind::NoQuote,
            Self::HashMismatch => ErrorKind::HashMismatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasurementError {
    #[error("measurement policy matching is not implemented")]
    NotImplemented,
    #[error("measurement rejected by policy: {0}")]
    Mismatch(String),
}

impl MeasurementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotImplemented => ErrorKind::MeasurementNotImplemented,
            Self::Mismatch(_) => ErrorKind::MeasurementMismatch,
        }
    }
}

/// Stages of a single certificate verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ParseCert,
    ExtractQuote,
    VerifyQuote,
    VerifyPubkeyHash,
    VerifyMeasurement,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ParseCert => "parse-cert",
            Self::ExtractQuote => "extract-quote",
            Self::VerifyQuote => "verify-quote",
            Self::VerifyPubkeyHash => "verify-pubkey-hash",
            Self::VerifyMeasurement => "verify-measurement",
        };
        f.write_str(name)
    }
}

/// The single terminal reason of a rejected verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected at {stage} ({kind}): {detail}")]
pub struct RejectReason {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub detail: String,
}

impl RejectReason {
    pub fn new(stage: Stage, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
        }
    }
}
