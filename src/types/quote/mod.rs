mod body;
mod header;
mod signature;

use anyhow::{anyhow, bail};
pub use body::*;
pub use header::*;
pub use signature::*;

use crate::constants::{ECDSA_256_WITH_P256_CURVE, QUOTE_V3, QUOTE_V4, QUOTE_V5};
use crate::types::Measurement;
use crate::utils::{self, crypto};

/// A parsed DCAP quote, borrowing the evidence it was read from.
#[derive(Debug)]
pub struct DcapQuote<'a> {
    /// Header of the Quote data structure.
    pub header: QuoteHeader,

    /// Enclave or TD report of the attested workload.
    pub body: QuoteBody,

    /// Signature over header and body.
    pub signature: QuoteSignatureData<'a>,

    signed_data: &'a [u8],
}

impl<'a> DcapQuote<'a> {
    pub fn read(bytes: &mut &'a [u8]) -> anyhow::Result<Self> {
        let start: &'a [u8] = bytes;

        let header = utils::read_from_bytes::<QuoteHeader>(bytes)
            .ok_or_else(|| anyhow!("underflow reading quote header"))?;

        let body = match header.version.get() {
            QUOTE_V3 | QUOTE_V4 => QuoteBody::read_by_tee_type(bytes, header.tee_type.get())?,
            QUOTE_V5 => QuoteBody::read_with_descriptor(bytes)?,
            other => bail!("unsupported quote version {other}"),
        };

        let signed_len = start.len() - bytes.len();
        let signature = QuoteSignatureData::read(bytes)?;

        Ok(DcapQuote {
            header,
            body,
            signature,
            signed_data: &start[..signed_len],
        })
    }

    /// Parse a full quote. Trailing bytes after the signature data are ignored.
    pub fn parse(bytes: &'a [u8]) -> anyhow::Result<Self> {
        let mut cursor = bytes;
        Self::read(&mut cursor)
    }

    /// The bytes covered by the ISV signature: header, body and, for v5, the body descriptor.
    pub fn signed_data(&self) -> &'a [u8] {
        self.signed_data
    }

    /// Check the ISV signature against the attestation key carried in the quote.
    ///
    /// This only proves the quote is internally consistent; the attestation key
    /// itself is certified by the verification library.
    pub fn verify_isv_signature(&self) -> anyhow::Result<()> {
        let key_type = self.header.attestation_key_type.get();
        if key_type != ECDSA_256_WITH_P256_CURVE {
            bail!("unsupported attestation key type {key_type}");
        }
        let public_key = crypto::sec1_from_raw_p256(&self.signature.attestation_pub_key);
        crypto::verify_p256_signature_bytes(
            self.signed_data,
            &self.signature.isv_signature,
            &public_key,
        )
    }

    pub fn report_data(&self) -> &[u8; 64] {
        self.body.report_data()
    }

    pub fn measurement(&self) -> Measurement {
        self.body.measurement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{TDX_TEE_TYPE, TD10_REPORT_LEN};
    use crate::testing::QuoteFixture;

    #[test]
    fn parses_signed_td_quote() {
        let fixture = QuoteFixture::new([7u8; 64]);
        let raw = fixture.build();

        let quote = DcapQuote::parse(&raw).unwrap();
        assert_eq!(quote.header.version.get(), QUOTE_V4);
        assert_eq!(quote.body.tee_type(), TDX_TEE_TYPE);
        assert_eq!(quote.report_data(), &[7u8; 64]);
        assert_eq!(quote.signed_data().len(), 48 + TD10_REPORT_LEN);
        quote.verify_isv_signature().unwrap();
    }

    #[test]
    fn tampered_body_fails_signature() {
        let mut raw = QuoteFixture::new([1u8; 64]).build();
        raw[48 + 10] ^= 0xff;

        let quote = DcapQuote::parse(&raw).unwrap();
        assert!(quote.verify_isv_signature().is_err());
    }

    #[test]
    fn v5_quote_with_td15_body() {
        let raw = QuoteFixture::new([3u8; 64]).v5_td15().build();

        let quote = DcapQuote::parse(&raw).unwrap();
        assert!(matches!(quote.body, QuoteBody::Td15QuoteBody(_)));
        assert_eq!(quote.report_data(), &[3u8; 64]);
        quote.verify_isv_signature().unwrap();
    }

    #[test]
    fn td_measurement_mapping() {
        let raw = QuoteFixture::new([0u8; 64]).mr_td([0x42; 48]).v5_td15().build();
        let measurement = DcapQuote::parse(&raw).unwrap().measurement();
        assert_eq!(measurement.code_measurement, vec![0x42; 48]);
        assert_eq!(measurement.signer_identity, vec![0u8; 48]);
        assert_eq!(measurement.product_id, 0);
        assert_eq!(measurement.security_version, 3);
    }

    #[test]
    fn truncated_quote_is_rejected() {
        let raw = QuoteFixture::new([0u8; 64]).build();
        assert!(DcapQuote::parse(&raw[..100]).is_err());
        assert!(DcapQuote::parse(&raw[..raw.len() - 10]).is_err());
        assert!(DcapQuote::parse(&[]).is_err());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut raw = QuoteFixture::new([0u8; 64]).build();
        raw[0] = 9;
        assert!(DcapQuote::parse(&raw).is_err());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut raw = QuoteFixture::new([5u8; 64]).build();
        raw.extend_from_slice(&[0xaa; 32]);
        let quote = DcapQuote::parse(&raw).unwrap();
        quote.verify_isv_signature().unwrap();
    }
}
