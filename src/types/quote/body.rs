use anyhow::{anyhow, bail};
use zerocopy::{little_endian, AsBytes};

use crate::constants::{
    BODY_SGX_ENCLAVE_REPORT_TYPE, BODY_TD_REPORT10_TYPE, BODY_TD_REPORT15_TYPE,
    ENCLAVE_REPORT_LEN, SGX_TEE_TYPE, TD10_REPORT_LEN, TD15_REPORT_LEN, TDX_TEE_TYPE,
};
use crate::types::report::{EnclaveReportBody, Td10ReportBody, Td15ReportBody};
use crate::types::Measurement;
use crate::utils;

/// Body of the Quote data structure.
#[derive(Debug)]
pub enum QuoteBody {
    SgxQuoteBody(EnclaveReportBody),
    Td10QuoteBody(Td10ReportBody),
    Td15QuoteBody(Td15ReportBody),
}

impl QuoteBody {
    /// v3 and v4 quotes: the body layout follows from the header's tee type.
    pub(crate) fn read_by_tee_type(bytes: &mut &[u8], tee_type: u32) -> anyhow::Result<Self> {
        match tee_type {
            SGX_TEE_TYPE => utils::read_from_bytes::<EnclaveReportBody>(bytes)
                .map(Self::SgxQuoteBody)
                .ok_or_else(|| anyhow!("underflow reading enclave report body")),
            TDX_TEE_TYPE => utils::read_from_bytes::<Td10ReportBody>(bytes)
                .map(Self::Td10QuoteBody)
                .ok_or_else(|| anyhow!("underflow reading td10 report body")),
            other => bail!("unsupported tee type {other:#x}"),
        }
    }

    /// v5 quotes carry an explicit body descriptor (type, size) before the body.
    pub(crate) fn read_with_descriptor(bytes: &mut &[u8]) -> anyhow::Result<Self> {
        let body_type = utils::read_from_bytes::<little_endian::U16>(bytes)
            .ok_or_else(|| anyhow!("underflow reading body type"))?
            .get();
        let body_size = utils::read_from_bytes::<little_endian::U32>(bytes)
            .ok_or_else(|| anyhow!("underflow reading body size"))?
            .get() as usize;

        let expected = match body_type {
            BODY_SGX_ENCLAVE_REPORT_TYPE => ENCLAVE_REPORT_LEN,
            BODY_TD_REPORT10_TYPE => TD10_REPORT_LEN,
            BODY_TD_REPORT15_TYPE => TD15_REPORT_LEN,
            other => bail!("unsupported quote body type {other}"),
        };
        if body_size != expected {
            bail!("quote body type {body_type} has size {body_size}, expected {expected}");
        }

        match body_type {
            BODY_SGX_ENCLAVE_REPORT_TYPE => Self::read_by_tee_type(bytes, SGX_TEE_TYPE),
            BODY_TD_REPORT10_TYPE => Self::read_by_tee_type(bytes, TDX_TEE_TYPE),
            _ => utils::read_from_bytes::<Td15ReportBody>(bytes)
                .map(Self::Td15QuoteBody)
                .ok_or_else(|| anyhow!("underflow reading td15 report body")),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::SgxQuoteBody(body) => body.as_bytes(),
            Self::Td10QuoteBody(body) => body.as_bytes(),
            Self::Td15QuoteBody(body) => body.as_bytes(),
        }
    }

    pub fn tee_type(&self) -> u32 {
        match self {
            Self::SgxQuoteBody(_) => SGX_TEE_TYPE,
            Self::Td10QuoteBody(_) | Self::Td15QuoteBody(_) => TDX_TEE_TYPE,
        }
    }

    /// The 64 bytes of caller data bound into the report by the hardware.
    pub fn report_data(&self) -> &[u8; 64] {
        match self {
            Self::SgxQuoteBody(body) => &body.user_report_data,
            Self::Td10QuoteBody(body) => &body.report_data,
            Self::Td15QuoteBody(body) => &body.base.report_data,
        }
    }

    /// Identity of the attested image.
    ///
    /// SGX: MRENCLAVE, MRSIGNER, ISVPRODID, ISVSVN.
    /// TDX: MRTD, MRSIGNERSEAM, no product id, TDX module SVN.
    pub fn measurement(&self) -> Measurement {
        match self {
            Self::SgxQuoteBody(body) => Measurement {
                code_measurement: body.mr_enclave.to_vec(),
                signer_identity: body.mr_signer.to_vec(),
                product_id: body.isv_prod_id.get(),
                security_version: body.isv_svn.get(),
            },
            Self::Td10QuoteBody(body) => tdx_measurement(body),
            Self::Td15QuoteBody(body) => tdx_measurement(&body.base),
        }
    }
}

fn tdx_measurement(body: &Td10ReportBody) -> Measurement {
    Measurement {
        code_measurement: body.mr_td.to_vec(),
        signer_identity: body.mr_signer_seam.to_vec(),
        product_id: 0,
        security_version: u16::from(body.tee_tcb_svn[0]),
    }
}
