//! Azure confidential VM backend.
//!
//! The TD report is obtained locally and exchanged for a quote at the
//! instance metadata service. IMDS cannot carry caller data into the quote,
//! so the public key hash travels as an appended trailer.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::constants::AZURE_IMDS_TDQUOTE_URL;
use crate::error::GenError;
use crate::generator::{HardwareReport, QuotingBackend};
use crate::transport::HttpTransport;
use crate::types::ReportData;
use crate::utils::encoding::{b64url_decode, b64url_encode};

/// Local source of the TD report handed to IMDS.
pub trait ReportSource: Send + Sync {
    fn td_report(&self, report_data: &ReportData) -> Result<Vec<u8>, GenError>;
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    quote: Option<String>,
}

pub struct ImdsBackend<R> {
    source: R,
    transport: Arc<dyn HttpTransport>,
    url: String,
}

impl<R: ReportSource> ImdsBackend<R> {
    pub fn new(source: R, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_url(source, transport, AZURE_IMDS_TDQUOTE_URL)
    }

    pub fn with_url(source: R, transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            source,
            transport,
            url: url.into(),
        }
    }
}

impl<R: ReportSource> QuotingBackend for ImdsBackend<R> {
    fn supports_inline_report_data(&self) -> bool {
        false
    }

    fn get_report(&self, report_data: &ReportData) -> Result<HardwareReport, GenError> {
        Ok(HardwareReport {
            report_data: *report_data,
            raw: self.source.td_report(report_data)?,
        })
    }

    fn get_quote(&self, report: &HardwareReport) -> Result<Vec<u8>, GenError> {
        let start = Instant::now();
        let body = json!({ "report": b64url_encode(&report.raw) });
        let response = self.transport.post_json(&self.url, &[], &body)?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "IMDS quote request");

        let envelope: QuoteEnvelope = serde_json::from_str(&response).map_err(|e| {
            GenError::TransportError(format!("malformed IMDS response: {e}"))
        })?;
        let encoded = envelope.quote.unwrap_or_default();
        if encoded.trim().is_empty() {
            error!(url = %self.url, "empty quote received from IMDS");
            return Err(GenError::RemoteEvidenceEmpty);
        }

        let quote = b64url_decode(&encoded)
            .map_err(|e| GenError::TransportError(format!("IMDS quote is not base64url: {e}")))?;
        if quote.is_empty() {
            return Err(GenError::RemoteEvidenceEmpty);
        }
        Ok(quote)
    }
}
