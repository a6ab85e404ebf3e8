//! RA-TLS for Intel TDX guests.
//!
//! An attester generates a key pair, binds the hash of its public key into a
//! TDX quote and embeds the quote in a self-signed certificate. A verifier
//! extracts the quote, checks it locally through the DCAP quote verification
//! library or remotely through an attestation service, and accepts the
//! certificate only if the evidence vouches for its key.

pub mod binder;
pub mod config;
pub mod constants;
pub mod error;
pub mod generator;
pub mod measurement;
pub mod orchestrator;
pub mod report_data;
pub mod transport;
pub mod types;
pub mod utils;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use binder::CertificateBinder;
pub use config::{AttestationServiceConfig, Provider};
pub use error::{BindError, ErrorKind, GenError, RejectReason, Stage, VerifyError};
pub use generator::{ImdsBackend, QuoteGenerator, QuotingBackend, TdxGuestBackend};
pub use measurement::MeasurementPolicy;
pub use orchestrator::{
    Accepted, Attester, Identity, IdentityVerifier, MeasurementCheck, PubkeyHashCheck,
    QuoteVerifier, VerifierPolicy,
};
pub use report_data::ReportDataBuilder;
pub use types::{Measurement, PublicKeyHash, Quote, ReportData, ReportDataBinding, VerificationResult};
pub use verifier::{QuoteVerifierLocal, QvlLibrary, RemoteAttestationClient};
