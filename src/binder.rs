//! Carrying a quote in an X.509 certificate and tying it to the certificate key.

use std::str::FromStr;
use std::time::{Duration, SystemTime};

use p256::ecdsa::{DerSignature, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, error, warn};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::asn1::{ObjectIdentifier, OctetString, OctetStringRef};
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::{Decode, Encode, Length, Writer};
use x509_cert::ext::{AsExtension, Extension};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

use crate::constants::RA_TLS_QUOTE_OID;
use crate::error::{BindError, GenError};
use crate::types::quote::DcapQuote;
use crate::types::{PublicKeyHash, Quote, ReportDataBinding};
use crate::utils::hash::sha256sum;
use crate::utils::Expireable;

pub const QUOTE_EXTENSION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap(RA_TLS_QUOTE_OID);

/// How far `not_before` is set before issuance.
const NOT_BEFORE_BACKDATE: Duration = Duration::from_secs(3600);

/// The quote extension: an OCTET STRING holding the quote and, with appended
/// binding, its hash trailer.
#[derive(Debug, Clone)]
pub struct QuoteExtension(pub Vec<u8>);

impl AssociatedOid for QuoteExtension {
    const OID: ObjectIdentifier = QUOTE_EXTENSION_OID;
}

impl Encode for QuoteExtension {
    fn encoded_len(&self) -> x509_cert::der::Result<Length> {
        OctetStringRef::new(&self.0)?.encoded_len()
    }

    fn encode(&self, writer: &mut impl Writer) -> x509_cert::der::Result<()> {
        OctetStringRef::new(&self.0)?.encode(writer)
    }
}

impl AsExtension for QuoteExtension {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }
}

/// Embeds and extracts quotes, and compares public key hashes.
///
/// The binding decides where the evidence hash lives: report data inside the
/// hardware signed quote, or an unsigned trailer after it.
#[derive(Debug, Clone, Copy)]
pub struct CertificateBinder {
    binding: ReportDataBinding,
}

impl CertificateBinder {
    pub fn new(binding: ReportDataBinding) -> Self {
        Self { binding }
    }

    pub fn binding(&self) -> ReportDataBinding {
        self.binding
    }

    /// Parse a PEM or DER certificate and check its validity window.
    pub fn parse_certificate(&self, bytes: &[u8]) -> Result<Certificate, BindError> {
        self.parse_certificate_at(bytes, SystemTime::now())
    }

    pub fn parse_certificate_at(&self, bytes: &[u8], now: SystemTime) -> Result<Certificate, BindError> {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let der = if bytes[start..].starts_with(b"-----BEGIN") {
            let pem = pem::parse(bytes)
                .map_err(|e| BindError::CertificateInvalid(format!("bad PEM: {e}")))?;
            if pem.tag() != "CERTIFICATE" {
                return Err(BindError::CertificateInvalid(format!(
                    "expected a CERTIFICATE block, found {}",
                    pem.tag()
                )));
            }
            pem.into_contents()
        } else {
            bytes.to_vec()
        };

        let cert = Certificate::from_der(&der)
            .map_err(|e| BindError::CertificateInvalid(format!("bad DER: {e}")))?;
        if !cert.valid_at(now) {
            return Err(BindError::CertificateInvalid(format!(
                "outside validity window {:?} .. {:?}",
                cert.tbs_certificate.validity.not_before, cert.tbs_certificate.validity.not_after
            )));
        }
        Ok(cert)
    }

    pub fn extract(&self, cert: &Certificate) -> Result<Quote, BindError> {
        let extension = cert
            .tbs_certificate
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.iter().find(|ext| ext.extn_id == QUOTE_EXTENSION_OID))
            .ok_or_else(|| BindError::NoQuote(format!("no {RA_TLS_QUOTE_OID} extension")))?;

        let carried = OctetString::from_der(extension.extn_value.as_bytes())
            .map_err(|e| BindError::NoQuote(format!("quote extension is not an OCTET STRING: {e}")))?
            .into_bytes();
        let quote = Quote::from_carrier(carried, self.binding)
            .ok_or_else(|| BindError::NoQuote("quote extension is too short".into()))?;
        debug!(len = quote.len(), binding = ?self.binding, "extracted quote");
        Ok(quote)
    }

    pub fn compute_pubkey_hash(&self, cert: &Certificate) -> Result<PublicKeyHash, BindError> {
        let spki = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| BindError::CertificateInvalid(format!("encoding public key: {e}")))?;
        Ok(PublicKeyHash(sha256sum(&spki)))
    }

    /// The hash the evidence vouches for, read from where the binding puts it.
    pub fn hash_from_evidence(&self, quote: &Quote) -> Result<PublicKeyHash, BindError> {
        match self.binding {
            ReportDataBinding::Inline => {
                let parsed = DcapQuote::parse(quote.evidence())
                    .map_err(|e| BindError::NoQuote(format!("{e:#}")))?;
                PublicKeyHash::from_prefix(parsed.report_data())
                    .ok_or_else(|| BindError::NoQuote("report data too short".into()))
            }
            ReportDataBinding::Appended => {
                let hash = quote
                    .appended_hash()
                    .ok_or_else(|| BindError::NoQuote("quote has no hash trailer".into()))?;
                warn!(hash = %hash, "using appended public key hash, not bound by the hardware signature");
                Ok(hash)
            }
        }
    }

    pub fn check(&self, hash_from_evidence: &PublicKeyHash, hash_from_cert: &PublicKeyHash) -> bool {
        if hash_from_evidence == hash_from_cert {
            debug!(hash = %hash_from_cert, "public key hash matches evidence");
            true
        } else {
            error!(
                evidence = %hash_from_evidence,
                certificate = %hash_from_cert,
                "public key hash does not match evidence"
            );
            false
        }
    }

    /// Self-signed certificate for `key` carrying `quote`.
    pub fn build_certificate(
        &self,
        key: &SigningKey,
        quote: &Quote,
        subject: &str,
        validity: Duration,
    ) -> Result<Certificate, GenError> {
        let cert_err = |e: &dyn std::fmt::Display| GenError::Certificate(e.to_string());

        let mut serial = [0u8; 16];
        OsRng.fill_bytes(&mut serial);
        serial[0] = (serial[0] & 0x7f) | 0x01;

        let now = SystemTime::now();
        let not_after = now
            .checked_add(validity)
            .ok_or_else(|| GenError::Certificate(format!("validity {validity:?} out of range")))?;
        // peers with a slow clock must still accept a freshly issued certificate
        let validity = Validity {
            not_before: Time::try_from(now.checked_sub(NOT_BEFORE_BACKDATE).unwrap_or(now))
                .map_err(|e| cert_err(&e))?,
            not_after: Time::try_from(not_after).map_err(|e| cert_err(&e))?,
        };

        let subject = Name::from_str(subject).map_err(|e| cert_err(&e))?;
        let spki = SubjectPublicKeyInfoOwned::from_key(*key.verifying_key()).map_err(|e| cert_err(&e))?;
        let mut builder = CertificateBuilder::new(
            Profile::Manual { issuer: None },
            SerialNumber::new(&serial).map_err(|e| cert_err(&e))?,
            validity,
            subject,
            spki,
            key,
        )
        .map_err(|e| cert_err(&e))?;
        builder
            .add_extension(&QuoteExtension(quote.as_bytes().to_vec()))
            .map_err(|e| cert_err(&e))?;
        builder.build::<DerSignature>().map_err(|e| cert_err(&e))
    }

    /// The public key hash a certificate for `key` will carry.
    pub fn hash_for_key(key: &SigningKey) -> Result<PublicKeyHash, GenError> {
        let spki = SubjectPublicKeyInfoOwned::from_key(*key.verifying_key())
            .map_err(|e| GenError::Certificate(e.to_string()))?;
        let der = spki.to_der().map_err(|e| GenError::Certificate(e.to_string()))?;
        Ok(PublicKeyHash(sha256sum(&der)))
    }
}
