use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{REPORT_DATA_LEN, SHA256_DIGEST_LEN};

pub mod quote;
pub mod report;
pub mod supplemental;

/// The 64 bytes handed to the quoting primitive and bound into the report.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ReportData(pub(crate) [u8; REPORT_DATA_LEN]);

impl ReportData {
    pub fn as_bytes(&self) -> &[u8; REPORT_DATA_LEN] {
        &self.0
    }

    /// Leading half, where the public key hash sits with inline binding.
    pub fn hash_slot(&self) -> &[u8] {
        &self.0[..SHA256_DIGEST_LEN]
    }
}

impl fmt::Debug for ReportData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReportData({})", hex::encode(self.0))
    }
}

/// SHA-256 of a certificate's DER encoded SubjectPublicKeyInfo.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyHash(#[serde(with = "hex::serde")] pub [u8; SHA256_DIGEST_LEN]);

impl PublicKeyHash {
    /// Takes the first 32 bytes of `bytes`; `None` if it is shorter.
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        let prefix = bytes.get(..SHA256_DIGEST_LEN)?;
        let mut hash = [0u8; SHA256_DIGEST_LEN];
        hash.copy_from_slice(prefix);
        Some(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8; SHA256_DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyHash({self})")
    }
}

/// How the public key hash travels with the evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDataBinding {
    /// The hash is placed in report data and signed by the hardware.
    Inline,
    /// Report data is pure entropy; the hash is appended after the quote
    /// and is not covered by the hardware signature.
    Appended,
}

impl ReportDataBinding {
    pub fn from_capability(supports_inline_report_data: bool) -> Self {
        if supports_inline_report_data {
            Self::Inline
        } else {
            Self::Appended
        }
    }
}

/// Owned hardware evidence, optionally followed by a raw hash trailer.
#[derive(Clone, PartialEq, Eq)]
pub struct Quote {
    data: Vec<u8>,
    evidence_len: usize,
}

impl Quote {
    /// Evidence as returned by the quoting primitive, no trailer.
    pub fn new(evidence: Vec<u8>) -> Self {
        let evidence_len = evidence.len();
        Self {
            data: evidence,
            evidence_len,
        }
    }

    pub fn with_appended_hash(evidence: Vec<u8>, hash: &PublicKeyHash) -> Self {
        let evidence_len = evidence.len();
        let mut data = evidence;
        data.extend_from_slice(hash.as_bytes());
        Self { data, evidence_len }
    }

    /// Rebuild a quote read back from a certificate. With `Appended` binding the
    /// last 32 bytes are the hash trailer; `None` if there is no room for one.
    pub fn from_carrier(data: Vec<u8>, binding: ReportDataBinding) -> Option<Self> {
        let evidence_len = match binding {
            ReportDataBinding::Inline => data.len(),
            ReportDataBinding::Appended => data.len().checked_sub(SHA256_DIGEST_LEN)?,
        };
        if evidence_len == 0 {
            return None;
        }
        Some(Self { data, evidence_len })
    }

    /// The hardware signed part.
    pub fn evidence(&self) -> &[u8] {
        &self.data[..self.evidence_len]
    }

    pub fn appended_hash(&self) -> Option<PublicKeyHash> {
        let trailer = &self.data[self.evidence_len..];
        if trailer.len() == SHA256_DIGEST_LEN {
            PublicKeyHash::from_prefix(trailer)
        } else {
            None
        }
    }

    /// Everything, trailer included, as carried in the certificate.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quote")
            .field("len", &self.data.len())
            .field("evidence_len", &self.evidence_len)
            .finish()
    }
}

/// Identity of the attested image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(with = "hex::serde")]
    pub code_measurement: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signer_identity: Vec<u8>,
    pub product_id: u16,
    pub security_version: u16,
}

/// Outcome of quote verification, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VerificationResult {
    Rejected,
    /// The quote is genuine but the platform has advisories or stale collateral.
    TrustedWithWarning,
    Trusted,
}

impl VerificationResult {
    pub fn is_trusted(self) -> bool {
        self != Self::Rejected
    }
}
