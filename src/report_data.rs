use rand::rngs::OsRng;
use rand::RngCore;

use crate::constants::{REPORT_DATA_LEN, SHA256_DIGEST_LEN};
use crate::types::{PublicKeyHash, ReportData, ReportDataBinding};

/// Builds the report data handed to the quoting primitive.
///
/// With [`ReportDataBinding::Inline`] a supplied hash occupies bytes `0..32`
/// and the rest is entropy. With [`ReportDataBinding::Appended`] all 64 bytes
/// are entropy and the caller appends the hash to the quote afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ReportDataBuilder {
    binding: ReportDataBinding,
}

impl ReportDataBuilder {
    pub fn new(binding: ReportDataBinding) -> Self {
        Self { binding }
    }

    pub fn binding(&self) -> ReportDataBinding {
        self.binding
    }

    pub fn build(&self, hash: Option<&PublicKeyHash>) -> ReportData {
        self.build_with_rng(hash, &mut OsRng)
    }

    pub fn build_with_rng<R: RngCore>(&self, hash: Option<&PublicKeyHash>, rng: &mut R) -> ReportData {
        let mut data = [0u8; REPORT_DATA_LEN];
        rng.fill_bytes(&mut data);

        if let (ReportDataBinding::Inline, Some(hash)) = (self.binding, hash) {
            data[..SHA256_DIGEST_LEN].copy_from_slice(hash.as_bytes());
        }
        ReportData(data)
    }
}
