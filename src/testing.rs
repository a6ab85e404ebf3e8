//! Test-only builders for synthetic evidence and scripted collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use rand::rngs::OsRng;
use zerocopy::{little_endian, AsBytes, FromZeroes};

use crate::constants::{
    BODY_TD_REPORT15_TYPE, ECDSA_256_WITH_P256_CURVE, INTEL_QE_VENDOR_ID, QUOTE_V4, QUOTE_V5,
    TD15_REPORT_LEN, TDX_TEE_TYPE,
};
use crate::error::TransportError;
use crate::transport::HttpTransport;
use crate::types::quote::QuoteHeader;
use crate::types::report::{Td10ReportBody, Td15ReportBody};
use crate::types::supplemental::SupplementalData;
use crate::verifier::local::{LibraryVerdict, QvStatus, VerificationLibrary};

/// Builds a TDX quote signed by a throwaway P-256 attestation key.
pub struct QuoteFixture {
    report_data: [u8; 64],
    mr_td: [u8; 48],
    v5_td15: bool,
    key: SigningKey,
}

impl QuoteFixture {
    pub fn new(report_data: [u8; 64]) -> Self {
        Self {
            report_data,
            mr_td: [0x11; 48],
            v5_td15: false,
            key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn mr_td(mut self, mr_td: [u8; 48]) -> Self {
        self.mr_td = mr_td;
        self
    }

    pub fn v5_td15(mut self) -> Self {
        self.v5_td15 = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let version = if self.v5_td15 { QUOTE_V5 } else { QUOTE_V4 };
        let header = QuoteHeader {
            version: little_endian::U16::new(version),
            attestation_key_type: little_endian::U16::new(ECDSA_256_WITH_P256_CURVE),
            tee_type: little_endian::U32::new(TDX_TEE_TYPE),
            qe_svn: little_endian::U16::new(4),
            pce_svn: little_endian::U16::new(13),
            qe_vendor_id: INTEL_QE_VENDOR_ID,
            user_data: [0u8; 20],
        };

        let mut body = Td10ReportBody::new_zeroed();
        body.tee_tcb_svn[0] = 3;
        body.mr_td = self.mr_td;
        body.report_data = self.report_data;

        let mut signed = header.as_bytes().to_vec();
        if self.v5_td15 {
            let mut td15 = Td15ReportBody::new_zeroed();
            td15.base = body;
            signed.extend_from_slice(&BODY_TD_REPORT15_TYPE.to_le_bytes());
            signed.extend_from_slice(&(TD15_REPORT_LEN as u32).to_le_bytes());
            signed.extend_from_slice(td15.as_bytes());
        } else {
            signed.extend_from_slice(body.as_bytes());
        }

        let signature: Signature = self.key.sign(&signed);
        let point = self.key.verifying_key().to_encoded_point(false);
        // cert data type 5 (PCK chain), empty
        let cert_data = [5u8, 0, 0, 0, 0, 0];

        let mut quote = signed;
        quote.extend_from_slice(&((128 + cert_data.len()) as u32).to_le_bytes());
        quote.extend_from_slice(&signature.to_bytes());
        quote.extend_from_slice(&point.as_bytes()[1..]);
        quote.extend_from_slice(&cert_data);
        quote
    }
}

/// Report data with the given hash in the leading half.
pub fn report_data_with_hash(hash: &[u8; 32]) -> [u8; 64] {
    let mut data = [0x5a; 64];
    data[..32].copy_from_slice(hash);
    data
}

/// Records every request and answers from a fixed script.
pub struct MockTransport {
    calls: AtomicUsize,
    response: Result<String, TransportError>,
    get_response: Result<String, TransportError>,
    last_request: Mutex<Option<(String, Vec<(String, String)>, serde_json::Value)>>,
}

impl MockTransport {
    pub fn responding(response: Result<String, TransportError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response,
            get_response: Err(TransportError::Http("no keys configured".into())),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_get(mut self, response: Result<String, TransportError>) -> Self {
        self.get_response = response;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, Vec<(String, String)>, serde_json::Value)> {
        self.last_request.lock().unwrap().clone()
    }
}

impl HttpTransport for MockTransport {
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        *self.last_request.lock().unwrap() = Some((url.to_string(), headers, body.clone()));
        self.response.clone()
    }

    fn get(&self, _url: &str) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.get_response.clone()
    }
}

/// Answers every quote with a fixed verdict and counts calls.
pub struct ScriptedLibrary {
    pub size: u32,
    pub status: u32,
    pub collateral_expired: bool,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedLibrary {
    pub fn returning(status: u32) -> Self {
        Self {
            size: SupplementalData::SIZE as u32,
            status,
            collateral_expired: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl VerificationLibrary for ScriptedLibrary {
    fn supplemental_data_size(&self) -> anyhow::Result<u32> {
        Ok(self.size)
    }

    fn verify_quote(&self, _: &[u8], _: i64, _: u32) -> anyhow::Result<LibraryVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LibraryVerdict {
            status: QvStatus::from_code(self.status),
            collateral_expired: self.collateral_expired,
            supplemental: None,
        })
    }
}
