use std::time::SystemTime;

use x509_cert::certificate::CertificateInner;

pub mod crypto;
pub mod encoding;
pub mod hash;

pub trait Expireable {
    fn valid_at(&self, timestamp: SystemTime) -> bool;
}

impl Expireable for CertificateInner {
    /// Validate a single certificate not_before/not_after
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        let nb = self.tbs_certificate.validity.not_before.to_system_time();
        let na = self.tbs_certificate.validity.not_after.to_system_time();
        !(timestamp < nb || na <= timestamp)
    }
}

/// Removes `std::mem::size_of<T>()` bytes from the front of `bytes` and returns it as a `T`.
///
/// Returns `None` and leaves `bytes` unchanged if it isn't long enough.
pub fn read_from_bytes<T: zerocopy::FromBytes>(bytes: &mut &[u8]) -> Option<T> {
    let front = T::read_from_prefix(bytes)?;
    *bytes = &bytes[std::mem::size_of::<T>()..];
    Some(front)
}

/// Removes a slice of `size` from the front of `bytes` and returns it.
///
/// Returns `None` and leaves `bytes` unchanged if it isn't long enough.
pub fn read_bytes<'a>(bytes: &mut &'a [u8], size: usize) -> Option<&'a [u8]> {
    if bytes.len() < size {
        return None;
    }
    let (front, rest) = bytes.split_at(size);
    *bytes = rest;
    Some(front)
}

/// Hex dump helper for `debug!` output of evidence buffers.
pub fn hex_preview(bytes: &[u8], max: usize) -> String {
    if bytes.len() <= max {
        hex::encode(bytes)
    } else {
        format!("{}..({} bytes)", hex::encode(&bytes[..max]), bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::little_endian;

    #[test]
    fn read_helpers_consume_prefix() {
        let data = [1u8, 0, 2, 3, 4];
        let mut cursor = &data[..];

        let value = read_from_bytes::<little_endian::U16>(&mut cursor).unwrap();
        assert_eq!(value.get(), 1);
        assert_eq!(read_bytes(&mut cursor, 2).unwrap(), &[2, 3]);
        assert_eq!(cursor, &[4]);
    }

    #[test]
    fn read_helpers_leave_short_input_untouched() {
        let data = [9u8];
        let mut cursor = &data[..];

        assert!(read_from_bytes::<little_endian::U32>(&mut cursor).is_none());
        assert!(read_bytes(&mut cursor, 2).is_none());
        assert_eq!(cursor, &[9]);
    }

    #[test]
    fn hex_preview_truncates() {
        assert_eq!(hex_preview(&[0xab, 0xcd], 4), "abcd");
        assert_eq!(hex_preview(&[0xab, 0xcd, 0xef], 1), "ab..(3 bytes)");
    }
}
