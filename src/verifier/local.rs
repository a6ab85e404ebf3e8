//! Quote verification against a locally installed verification library.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::VerifyError;
use crate::types::quote::DcapQuote;
use crate::types::supplemental::SupplementalData;
use crate::types::{Quote, VerificationResult};

/// The verification library is not reentrant; one call at a time per process.
static LIBRARY_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// `sgx_ql_qv_result_t` as returned by the verification library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QvStatus {
    Ok,
    ConfigNeeded,
    OutOfDate,
    OutOfDateConfigNeeded,
    InvalidSignature,
    Revoked,
    Unspecified,
    SwHardeningNeeded,
    ConfigAndSwHardeningNeeded,
    Unknown(u32),
}

impl QvStatus {
    pub const UNSPECIFIED_CODE: u32 = 0xA006;

    pub fn from_code(code: u32) -> Self {
        match code {
            0x0000 => Self::Ok,
            0xA001 => Self::ConfigNeeded,
            0xA002 => Self::OutOfDate,
            0xA003 => Self::OutOfDateConfigNeeded,
            0xA004 => Self::InvalidSignature,
            0xA005 => Self::Revoked,
            0xA006 => Self::Unspecified,
            0xA007 => Self::SwHardeningNeeded,
            0xA008 => Self::ConfigAndSwHardeningNeeded,
            other => Self::Unknown(other),
        }
    }
}

/// What the library said about one quote.
#[derive(Debug, Clone)]
pub struct LibraryVerdict {
    pub status: QvStatus,
    pub collateral_expired: bool,
    pub supplemental: Option<SupplementalData>,
}

/// The two library entry points the verifier needs.
pub trait VerificationLibrary: Send + Sync {
    fn supplemental_data_size(&self) -> anyhow::Result<u32>;

    /// `expiration_check_date` is seconds since the epoch.
    fn verify_quote(
        &self,
        quote: &[u8],
        expiration_check_date: i64,
        supplemental_size: u32,
    ) -> anyhow::Result<LibraryVerdict>;
}

impl<L: VerificationLibrary + ?Sized> VerificationLibrary for Box<L> {
    fn supplemental_data_size(&self) -> anyhow::Result<u32> {
        (**self).supplemental_data_size()
    }

    fn verify_quote(
        &self,
        quote: &[u8],
        expiration_check_date: i64,
        supplemental_size: u32,
    ) -> anyhow::Result<LibraryVerdict> {
        (**self).verify_quote(quote, expiration_check_date, supplemental_size)
    }
}

pub struct QuoteVerifierLocal<L> {
    library: L,
}

impl<L: VerificationLibrary> QuoteVerifierLocal<L> {
    pub fn new(library: L) -> Self {
        Self { library }
    }

    /// Verify with the local wall clock.
    ///
    /// The wall clock is not trusted time: a host that controls it can make
    /// expired collateral look current. Use [`Self::verify_at`] with a trusted
    /// time source where one exists.
    pub fn verify(&self, quote: &Quote) -> Result<VerificationResult, VerifyError> {
        self.verify_at(quote, SystemTime::now())
    }

    pub fn verify_at(&self, quote: &Quote, now: SystemTime) -> Result<VerificationResult, VerifyError> {
        // held across every call into the library
        let _guard = LIBRARY_LOCK.lock();

        let supplemental_size = self
            .library
            .supplemental_data_size()
            .map_err(|e| VerifyError::LibraryMismatch(format!("{e:#}")))?;
        if supplemental_size as usize != SupplementalData::SIZE {
            return Err(VerifyError::LibraryMismatch(format!(
                "library expects {supplemental_size} bytes of supplemental data, built for {}",
                SupplementalData::SIZE
            )));
        }

        let evidence = quote.evidence();
        let parsed = match DcapQuote::parse(evidence) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %format!("{e:#}"), "malformed quote");
                return Ok(VerificationResult::Rejected);
            }
        };
        if let Err(e) = parsed.verify_isv_signature() {
            error!(error = %format!("{e:#}"), "quote signature check failed");
            return Ok(VerificationResult::Rejected);
        }

        let check_date = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let verdict = match self.library.verify_quote(evidence, check_date, supplemental_size) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(error = %format!("{e:#}"), "quote verification call failed");
                return Ok(VerificationResult::Rejected);
            }
        };

        if let Some(supplemental) = &verdict.supplemental {
            debug!(
                version = supplemental.version.get(),
                earliest_expiration = ?supplemental.earliest_expiration(),
                tcb_level_date = ?supplemental.tcb_level_date(),
                advisories = ?supplemental.advisory_ids(),
                "supplemental data"
            );
        }

        let result = map_verdict(&verdict);
        match result {
            VerificationResult::Trusted => info!("quote verified"),
            VerificationResult::TrustedWithWarning => warn!(
                status = ?verdict.status,
                collateral_expired = verdict.collateral_expired,
                "quote verified with non-terminal result"
            ),
            VerificationResult::Rejected => error!(status = ?verdict.status, "quote rejected"),
        }
        Ok(result)
    }
}

fn map_verdict(verdict: &LibraryVerdict) -> VerificationResult {
    match verdict.status {
        QvStatus::Ok if verdict.collateral_expired => VerificationResult::TrustedWithWarning,
        QvStatus::Ok => VerificationResult::Trusted,
        QvStatus::ConfigNeeded
        | QvStatus::OutOfDate
        | QvStatus::OutOfDateConfigNeeded
        | QvStatus::SwHardeningNeeded
        | QvStatus::ConfigAndSwHardeningNeeded => VerificationResult::TrustedWithWarning,
        QvStatus::InvalidSignature
        | QvStatus::Revoked
        | QvStatus::Unspecified
        | QvStatus::Unknown(_) => VerificationResult::Rejected,
    }
}
