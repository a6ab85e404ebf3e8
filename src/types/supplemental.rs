use chrono::{DateTime, Utc};
use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

/// Supplemental data filled in by the quote verification library
/// (`sgx_ql_qv_supplemental_t`, version 3 layout, packed).
///
/// The library reports the size it expects; a different size means the
/// loaded library and this definition disagree.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct SupplementalData {
    pub version: little_endian::U32,
    /// Earliest issue date of all collateral (seconds since epoch).
    pub earliest_issue_date: little_endian::I64,
    pub latest_issue_date: little_endian::I64,
    /// Earliest expiration date of all collateral.
    pub earliest_expiration_date: little_endian::I64,
    /// Date of the TCB level the platform matched.
    pub tcb_level_date_tag: little_endian::I64,
    pub pck_crl_num: little_endian::U32,
    pub root_ca_crl_num: little_endian::U32,
    pub tcb_eval_ref_num: little_endian::U32,
    pub root_key_id: [u8; 48],
    pub pck_ppid: [u8; 16],
    pub tcb_cpusvn: [u8; 16],
    pub tcb_pce_isvsvn: little_endian::U16,
    pub pce_id: little_endian::U16,
    pub tee_type: little_endian::U32,
    pub sgx_type: u8,
    pub platform_instance_id: [u8; 16],
    pub dynamic_platform: little_endian::U32,
    pub cached_keys: little_endian::U32,
    pub smt_enabled: little_endian::U32,
    /// Comma separated advisory ids, NUL terminated.
    pub sa_list: [u8; 320],
}

impl SupplementalData {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn earliest_expiration(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.earliest_expiration_date.get(), 0)
    }

    pub fn tcb_level_date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.tcb_level_date_tag.get(), 0)
    }

    /// Advisory ids reported for the platform's TCB level.
    pub fn advisory_ids(&self) -> Vec<String> {
        let end = self
            .sa_list
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.sa_list.len());
        String::from_utf8_lossy(&self.sa_list[..end])
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_packed() {
        assert_eq!(SupplementalData::SIZE, 485);
    }

    #[test]
    fn advisory_ids_stop_at_nul() {
        let mut data = SupplementalData::new_zeroed();
        let list = b"INTEL-SA-00586, INTEL-SA-00615\0garbage";
        data.sa_list[..list.len()].copy_from_slice(list);
        assert_eq!(
            data.advisory_ids(),
            vec!["INTEL-SA-00586".to_string(), "INTEL-SA-00615".to_string()]
        );
    }

    #[test]
    fn dates_convert() {
        let mut data = SupplementalData::new_zeroed();
        data.earliest_expiration_date = little_endian::I64::new(1_700_000_000);
        assert_eq!(data.earliest_expiration().unwrap().timestamp(), 1_700_000_000);
    }
}
