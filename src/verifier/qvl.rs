//! Run-time binding to Intel's DCAP quote verification library.

use std::ffi::c_void;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use libloading::{Library, Symbol};
use tracing::debug;

use crate::types::supplemental::SupplementalData;
use crate::verifier::local::{LibraryVerdict, QvStatus, VerificationLibrary};

pub const QVL_LIBRARY_NAME: &str = "libsgx_dcap_quoteverify.so.1";

const SGX_QL_SUCCESS: u32 = 0;

type GetSupplementalDataSizeFn = unsafe extern "C" fn(p_data_size: *mut u32) -> u32;

type VerifyQuoteFn = unsafe extern "C" fn(
    p_quote: *const u8,
    quote_size: u32,
    p_quote_collateral: *const c_void,
    expiration_check_date: i64,
    p_collateral_expiration_status: *mut u32,
    p_quote_verification_result: *mut u32,
    p_qve_report_info: *mut c_void,
    supplemental_data_size: u32,
    p_supplemental_data: *mut u8,
) -> u32;

/// `libsgx_dcap_quoteverify` loaded with `dlopen`. Collateral is fetched by
/// the library itself through the platform's quote provider library.
pub struct QvlLibrary {
    lib: Library,
}

impl QvlLibrary {
    pub fn load_default() -> anyhow::Result<Self> {
        Self::load(QVL_LIBRARY_NAME)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        // SAFETY: the library's initializers have no preconditions.
        let lib = unsafe { Library::new(path) }
            .with_context(|| format!("loading {}", path.display()))?;
        debug!(library = %path.display(), "loaded quote verification library");
        Ok(Self { lib })
    }

    fn symbol<T>(&self, name: &[u8]) -> anyhow::Result<Symbol<'_, T>> {
        // SAFETY: callers pair each symbol name with its C prototype.
        unsafe { self.lib.get::<T>(name) }
            .map_err(|e| anyhow!("resolving {}: {e}", String::from_utf8_lossy(name)))
    }
}

impl VerificationLibrary for QvlLibrary {
    fn supplemental_data_size(&self) -> anyhow::Result<u32> {
        let get_size: Symbol<GetSupplementalDataSizeFn> =
            self.symbol(b"tdx_qv_get_quote_supplemental_data_size\0")?;
        let mut size = 0u32;
        // SAFETY: `size` is a valid out pointer for the duration of the call.
        let status = unsafe { get_size(&mut size) };
        if status != SGX_QL_SUCCESS {
            bail!("tdx_qv_get_quote_supplemental_data_size failed: {status:#06x}");
        }
        Ok(size)
    }

    fn verify_quote(
        &self,
        quote: &[u8],
        expiration_check_date: i64,
        supplemental_size: u32,
    ) -> anyhow::Result<LibraryVerdict> {
        let verify: Symbol<VerifyQuoteFn> = self.symbol(b"tdx_qv_verify_quote\0")?;
        let quote_size = u32::try_from(quote.len()).context("quote too large")?;

        let mut supplemental = vec![0u8; supplemental_size as usize];
        let mut expiration_status = 1u32;
        let mut result = QvStatus::UNSPECIFIED_CODE;
        // SAFETY: all pointers reference live buffers of the advertised sizes; a
        // null collateral asks the library to fetch it through the QPL.
        let status = unsafe {
            verify(
                quote.as_ptr(),
                quote_size,
                std::ptr::null(),
                expiration_check_date,
                &mut expiration_status,
                &mut result,
                std::ptr::null_mut(),
                supplemental_size,
                supplemental.as_mut_ptr(),
            )
        };
        if status != SGX_QL_SUCCESS {
            bail!("tdx_qv_verify_quote failed: {status:#06x}");
        }

        let mut cursor = &supplemental[..];
        Ok(LibraryVerdict {
            status: QvStatus::from_code(result),
            collateral_expired: expiration_status != 0,
            supplemental: crate::utils::read_from_bytes::<SupplementalData>(&mut cursor),
        })
    }
}
