//! Quote generation inside a TDX guest.
//!
//! The TD report comes from the `tdx_guest` driver (`TDX_CMD_GET_REPORT0`),
//! the quote from the kernel's configfs-tsm interface, which hands the report
//! data to the host quoting service and returns the signed quote.

use std::fs::{self, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::constants::{REPORT_DATA_LEN, TD_REPORT_LEN, TD_REPORT_REPORT_DATA_OFFSET};
use crate::error::GenError;
use crate::generator::{HardwareReport, QuotingBackend, ReportSource};
use crate::types::ReportData;

const TDX_GUEST_DEVICE: &str = "/dev/tdx_guest";
const TSM_REPORT_ROOT: &str = "/sys/kernel/config/tsm/report";

/// `struct tdx_report_req` from `linux/tdx-guest.h`.
#[repr(C)]
pub struct TdxReportReq {
    reportdata: [u8; REPORT_DATA_LEN],
    tdreport: [u8; TD_REPORT_LEN],
}

nix::ioctl_readwrite!(tdx_cmd_get_report0, b'T', 1, TdxReportReq);

static TSM_ENTRY_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct TdxGuestBackend {
    device: PathBuf,
    tsm_root: PathBuf,
}

impl Default for TdxGuestBackend {
    fn default() -> Self {
        Self {
            device: PathBuf::from(TDX_GUEST_DEVICE),
            tsm_root: PathBuf::from(TSM_REPORT_ROOT),
        }
    }
}

impl TdxGuestBackend {
    pub fn new(device: impl Into<PathBuf>, tsm_root: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            tsm_root: tsm_root.into(),
        }
    }

    fn td_report_raw(&self, report_data: &ReportData) -> Result<Vec<u8>, GenError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
            .map_err(|e| {
                GenError::HardwareUnavailable(format!("opening {}: {e}", self.device.display()))
            })?;

        let mut request = TdxReportReq {
            reportdata: *report_data.as_bytes(),
            tdreport: [0u8; TD_REPORT_LEN],
        };
        // SAFETY: `request` matches the driver's tdx_report_req layout and lives for the call.
        unsafe { tdx_cmd_get_report0(device.as_raw_fd(), &mut request) }
            .map_err(|e| GenError::HardwareUnavailable(format!("TDX_CMD_GET_REPORT0: {e}")))?;

        let echoed =
            &request.tdreport[TD_REPORT_REPORT_DATA_OFFSET..TD_REPORT_REPORT_DATA_OFFSET + REPORT_DATA_LEN];
        if echoed != report_data.as_bytes() {
            return Err(GenError::HardwareUnavailable(
                "TD report does not carry the requested report data".into(),
            ));
        }
        debug!(device = %self.device.display(), "obtained TD report");
        Ok(request.tdreport.to_vec())
    }
}

impl ReportSource for TdxGuestBackend {
    fn td_report(&self, report_data: &ReportData) -> Result<Vec<u8>, GenError> {
        self.td_report_raw(report_data)
    }
}

impl QuotingBackend for TdxGuestBackend {
    fn supports_inline_report_data(&self) -> bool {
        true
    }

    fn get_report(&self, report_data: &ReportData) -> Result<HardwareReport, GenError> {
        Ok(HardwareReport {
            report_data: *report_data,
            raw: self.td_report_raw(report_data)?,
        })
    }

    fn get_quote(&self, report: &HardwareReport) -> Result<Vec<u8>, GenError> {
        let entry = TsmEntry::create(&self.tsm_root)?;
        entry.write("inblob", report.report_data.as_bytes())?;

        let quote = entry.read("outblob")?;
        if let Ok(provider) = entry.read("provider") {
            debug!(provider = %String::from_utf8_lossy(&provider).trim(), "tsm quote provider");
        }
        if quote.is_empty() {
            return Err(GenError::HardwareUnavailable("configfs-tsm returned an empty quote".into()));
        }
        Ok(quote)
    }
}

/// A report entry under the configfs-tsm root, removed on drop.
struct TsmEntry {
    path: PathBuf,
}

impl TsmEntry {
    fn create(root: &Path) -> Result<Self, GenError> {
        let name = format!(
            "ratls-{}-{}",
            std::process::id(),
            TSM_ENTRY_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let path = root.join(name);
        fs::create_dir(&path).map_err(|e| {
            GenError::HardwareUnavailable(format!("creating {}: {e}", path.display()))
        })?;
        Ok(Self { path })
    }

    fn write(&self, attr: &str, data: &[u8]) -> Result<(), GenError> {
        let path = self.path.join(attr);
        fs::write(&path, data)
            .map_err(|e| GenError::HardwareUnavailable(format!("writing {}: {e}", path.display())))
    }

    fn read(&self, attr: &str) -> Result<Vec<u8>, GenError> {
        let path = self.path.join(attr);
        fs::read(&path)
            .map_err(|e| GenError::HardwareUnavailable(format!("reading {}: {e}", path.display())))
    }
}

impl Drop for TsmEntry {
    fn drop(&mut self) {
        // configfs entries are removed with rmdir, their attributes go with them
        if let Err(e) = fs::remove_dir(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove tsm report entry");
        }
    }
}
