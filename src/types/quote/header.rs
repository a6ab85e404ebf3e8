use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

use crate::constants::HEADER_LEN;

/// Header of the SGX/TDX Quote data structure.
///
/// We use zerocopy for zero-copy parsing of the quote header from raw bytes.
/// This allows us to safely interpret the raw byte slice as a structured type without copying the data.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct QuoteHeader {
    /// Version of the quote data structure - 3, 4 or 5
    pub version: little_endian::U16,

    /// Type of the Attestation Key used by the Quoting Enclave -
    /// 2 (ECDSA-256-with-P-256 curve)
    /// 3 (ECDSA-384-with-P-384 curve)
    pub attestation_key_type: little_endian::U16,

    /// TEE for this Attestation
    /// 0x00000000: SGX
    /// 0x00000081: TDX
    pub tee_type: little_endian::U32,

    /// Security Version of the Quoting Enclave
    pub qe_svn: little_endian::U16,

    /// Security Version of the PCE
    pub pce_svn: little_endian::U16,

    /// Unique identifier of the QE Vendor.
    pub qe_vendor_id: [u8; 16],

    /// Custom user-defined data. The first 16 bytes hold the platform identifier.
    pub user_data: [u8; 20],
}

const _: () = assert!(std::mem::size_of::<QuoteHeader>() == HEADER_LEN);
