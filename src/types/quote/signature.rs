use anyhow::anyhow;
use zerocopy::little_endian;

use crate::utils;

/// Signature data for SGX and TDX quotes.
///
/// In the intel docs, this is A 4.4: "ECDSA 256-bit Quote Signature Data Structure".
/// Only the ISV signature and the attestation key are interpreted here; the
/// certification data (QE report, PCK chain) is left to the verification library.
#[derive(Debug)]
pub struct QuoteSignatureData<'a> {
    /// Signature of the quote header + body by the attestation key, raw [r][s].
    pub isv_signature: [u8; 64],

    /// The public key used to generate the isv_signature, raw [x][y].
    pub attestation_pub_key: [u8; 64],

    /// Certification data following the signature header.
    pub cert_data: &'a [u8],
}

impl<'a> QuoteSignatureData<'a> {
    pub fn read(bytes: &mut &'a [u8]) -> anyhow::Result<Self> {
        let signature_len = utils::read_from_bytes::<little_endian::U32>(bytes)
            .ok_or_else(|| anyhow!("underflow reading signature length"))?
            .get();

        let mut signature = utils::read_bytes(bytes, signature_len as usize)
            .ok_or_else(|| anyhow!("underflow reading signature"))?;

        let signature_header: EcdsaSignatureHeader = utils::read_from_bytes(&mut signature)
            .ok_or_else(|| anyhow!("underflow reading signature header"))?;

        Ok(QuoteSignatureData {
            isv_signature: signature_header.isv_signature,
            attestation_pub_key: signature_header.attestation_pub_key,
            cert_data: signature,
        })
    }
}

#[derive(Debug, zerocopy::FromBytes, zerocopy::FromZeroes)]
pub struct EcdsaSignatureHeader {
    pub isv_signature: [u8; 64],
    pub attestation_pub_key: [u8; 64],
}
