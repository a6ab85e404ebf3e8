use tracing::{debug, info};

use crate::error::GenError;
use crate::report_data::ReportDataBuilder;
use crate::types::{PublicKeyHash, Quote, ReportData, ReportDataBinding};
use crate::utils::hex_preview;

pub mod imds;
pub mod tdx_guest;

pub use imds::{ImdsBackend, ReportSource};
pub use tdx_guest::TdxGuestBackend;

/// Hardware report produced by the first step of quote generation.
#[derive(Debug, Clone)]
pub struct HardwareReport {
    /// The report data the report was requested with.
    pub report_data: ReportData,
    /// The platform's raw report (a TDREPORT_STRUCT on TDX).
    pub raw: Vec<u8>,
}

/// A quoting primitive: get a report, then turn it into a quote.
pub trait QuotingBackend: Send + Sync {
    /// Whether caller data in report data ends up hardware signed in the quote.
    fn supports_inline_report_data(&self) -> bool;

    fn get_report(&self, report_data: &ReportData) -> Result<HardwareReport, GenError>;

    fn get_quote(&self, report: &HardwareReport) -> Result<Vec<u8>, GenError>;
}

/// Produces quotes bound to a public key hash.
pub struct QuoteGenerator<B> {
    backend: B,
    builder: ReportDataBuilder,
}

impl<B: QuotingBackend> QuoteGenerator<B> {
    pub fn new(backend: B) -> Self {
        let binding = ReportDataBinding::from_capability(backend.supports_inline_report_data());
        Self {
            backend,
            builder: ReportDataBuilder::new(binding),
        }
    }

    pub fn binding(&self) -> ReportDataBinding {
        self.builder.binding()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn generate(&self, hash: Option<&PublicKeyHash>) -> Result<Quote, GenError> {
        let report_data = self.builder.build(hash);
        debug!(report_data = ?report_data, "built report data");

        let report = self.backend.get_report(&report_data)?;
        let evidence = self.backend.get_quote(&report)?;
        if evidence.is_empty() {
            return Err(GenError::HardwareUnavailable(
                "quoting primitive returned an empty quote".into(),
            ));
        }
        debug!(quote = %hex_preview(&evidence, 64), "received quote");

        let quote = match (self.binding(), hash) {
            (ReportDataBinding::Appended, Some(hash)) => {
                info!(
                    hash = %hash,
                    "backend cannot bind report data, appending public key hash to the quote"
                );
                Quote::with_appended_hash(evidence, hash)
            }
            _ => Quote::new(evidence),
        };
        info!(len = quote.len(), binding = ?self.binding(), "generated quote");
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Echoes report data back as the "quote".
    struct EchoBackend {
        inline: bool,
        quote: Option<Vec<u8>>,
        seen: Mutex<Vec<ReportData>>,
    }

    impl EchoBackend {
        fn new(inline: bool) -> Self {
            Self {
                inline,
                quote: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl QuotingBackend for EchoBackend {
        fn supports_inline_report_data(&self) -> bool {
            self.inline
        }

        fn get_report(&self, report_data: &ReportData) -> Result<HardwareReport, GenError> {
            self.seen.lock().unwrap().push(*report_data);
            Ok(HardwareReport {
                report_data: *report_data,
                raw: report_data.as_bytes().to_vec(),
            })
        }

        fn get_quote(&self, report: &HardwareReport) -> Result<Vec<u8>, GenError> {
            Ok(self.quote.clone().unwrap_or_else(|| report.raw.clone()))
        }
    }

    struct FailingBackend;

    impl QuotingBackend for FailingBackend {
        fn supports_inline_report_data(&self) -> bool {
            true
        }

        fn get_report(&self, _: &ReportData) -> Result<HardwareReport, GenError> {
            Err(GenError::HardwareUnavailable("no device".into()))
        }

        fn get_quote(&self, _: &HardwareReport) -> Result<Vec<u8>, GenError> {
            unreachable!()
        }
    }

    #[test]
    fn inline_backend_gets_hash_in_report_data() {
        let hash = PublicKeyHash([0x42; 32]);
        let generator = QuoteGenerator::new(EchoBackend::new(true));
        let quote = generator.generate(Some(&hash)).unwrap();

        assert_eq!(generator.binding(), ReportDataBinding::Inline);
        assert_eq!(&quote.evidence()[..32], hash.as_bytes());
        assert_eq!(quote.appended_hash(), None);
    }

    #[test]
    fn appended_backend_gets_trailer() {
        let hash = PublicKeyHash([0x42; 32]);
        let generator = QuoteGenerator::new(EchoBackend::new(false));
        let quote = generator.generate(Some(&hash)).unwrap();

        assert_eq!(quote.len(), 64 + 32);
        assert_eq!(quote.evidence().len(), 64);
        assert_eq!(quote.appended_hash(), Some(hash));
        let seen = generator.backend().seen.lock().unwrap();
        assert_ne!(seen[0].hash_slot(), hash.as_bytes());
    }

    #[test]
    fn appended_backend_without_hash_has_no_trailer() {
        let generator = QuoteGenerator::new(EchoBackend::new(false));
        let quote = generator.generate(None).unwrap();
        assert_eq!(quote.len(), 64);
    }

    #[test]
    fn empty_quote_is_an_error() {
        let mut backend = EchoBackend::new(true);
        backend.quote = Some(Vec::new());
        let err = QuoteGenerator::new(backend).generate(None).unwrap_err();
        assert!(matches!(err, GenError::HardwareUnavailable(_)));
    }

    #[test]
    fn backend_failure_propagates() {
        let err = QuoteGenerator::new(FailingBackend).generate(None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HardwareUnavailable);
    }
}
