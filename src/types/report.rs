use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

use crate::constants::{ENCLAVE_REPORT_LEN, TD10_REPORT_LEN, TD15_REPORT_LEN};

/// SGX enclave report body (ISV enclave report or QE report).
///
/// In the intel docs, this is A 3.4: "Enclave Report Body".
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct EnclaveReportBody {
    /// Security version of the CPU (raw value).
    pub cpu_svn: [u8; 16],
    /// SSA frame extended feature set.
    pub misc_select: little_endian::U32,
    pub reserved_1: [u8; 28],
    /// Attributes of the enclave (SECS.ATTRIBUTES).
    pub sgx_attributes: [u8; 16],
    /// Measurement of the enclave code and data.
    pub mr_enclave: [u8; 32],
    pub reserved_2: [u8; 32],
    /// Hash of the enclave signer's public key.
    pub mr_signer: [u8; 32],
    pub reserved_3: [u8; 96],
    pub isv_prod_id: little_endian::U16,
    pub isv_svn: little_endian::U16,
    pub reserved_4: [u8; 60],
    /// Caller supplied report data.
    pub user_report_data: [u8; 64],
}

/// TD report body of a TDX 1.0 quote.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct Td10ReportBody {
    /// Security version of the TDX TCB; byte 0 is the TDX module SVN.
    pub tee_tcb_svn: [u8; 16],
    /// Measurement of the TDX module.
    pub mr_seam: [u8; 48],
    /// Signer of the TDX module, zero for Intel's own module.
    pub mr_signer_seam: [u8; 48],
    pub seam_attributes: [u8; 8],
    pub td_attributes: [u8; 8],
    pub xfam: [u8; 8],
    /// Measurement of the initial contents of the TD.
    pub mr_td: [u8; 48],
    pub mr_config_id: [u8; 48],
    pub mr_owner: [u8; 48],
    pub mr_owner_config: [u8; 48],
    pub rt_mr0: [u8; 48],
    pub rt_mr1: [u8; 48],
    pub rt_mr2: [u8; 48],
    pub rt_mr3: [u8; 48],
    /// Caller supplied report data.
    pub report_data: [u8; 64],
}

/// TD report body of a TDX 1.5 quote: the 1.0 body plus two trailing fields.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct Td15ReportBody {
    pub base: Td10ReportBody,
    pub tee_tcb_svn_2: [u8; 16],
    pub mr_service_td: [u8; 48],
}

const _: () = assert!(std::mem::size_of::<EnclaveReportBody>() == ENCLAVE_REPORT_LEN);
const _: () = assert!(std::mem::size_of::<Td10ReportBody>() == TD10_REPORT_LEN);
const _: () = assert!(std::mem::size_of::<Td15ReportBody>() == TD15_REPORT_LEN);
