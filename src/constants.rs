// https://github.com/intel/SGX-TDX-DCAP-QuoteVerificationLibrary/blob/16b7291a7a86e486fdfcf1dfb4be885c0cc00b4e/Src/AttestationLibrary/src/QuoteVerification/QuoteConstants.h

pub const SGX_TEE_TYPE: u32 = 0x00000000;
pub const TDX_TEE_TYPE: u32 = 0x00000081;

pub const ECDSA_256_WITH_P256_CURVE: u16 = 2;

pub const QUOTE_V3: u16 = 3;
pub const QUOTE_V4: u16 = 4;
pub const QUOTE_V5: u16 = 5;

/// Body type tags of a v5 quote body descriptor.
pub const BODY_SGX_ENCLAVE_REPORT_TYPE: u16 = 1;
pub const BODY_TD_REPORT10_TYPE: u16 = 2;
pub const BODY_TD_REPORT15_TYPE: u16 = 3;

pub const HEADER_LEN: usize = 48;

pub const ENCLAVE_REPORT_LEN: usize = 384;
pub const TD10_REPORT_LEN: usize = 584;
pub const TD15_REPORT_LEN: usize = 648;

pub const INTEL_QE_VENDOR_ID: [u8; 16] = [0x93, 0x9A, 0x72, 0x33, 0xF7, 0x9C, 0x4C, 0xA9, 0x94, 0x0A, 0x0D, 0xB3, 0x95, 0x7F, 0x06, 0x07];

/// Size of the caller controlled REPORTDATA field of SGX and TDX reports.
pub const REPORT_DATA_LEN: usize = 64;

/// Size of a TDREPORT_STRUCT as returned by the TDX module.
pub const TD_REPORT_LEN: usize = 1024;

/// Offset of REPORTDATA inside a TDREPORT_STRUCT (inside REPORTMACSTRUCT).
pub const TD_REPORT_REPORT_DATA_OFFSET: usize = 128;

pub const SHA256_DIGEST_LEN: usize = 32;
pub const SHA512_DIGEST_LEN: usize = 64;

/// X.509 extension carrying the raw quote in RA-TLS certificates.
pub const RA_TLS_QUOTE_OID: &str = "1.2.840.113741.1337.6";

/// Default location of the remote attestation service configuration.
pub const DEFAULT_ATTESTATION_CONFIG_PATH: &str = "/etc/azure_tdx_config.json";

/// Azure instance metadata endpoint that turns a TD report into a quote.
pub const AZURE_IMDS_TDQUOTE_URL: &str = "http://169.254.169.254/acc/tdquote";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
