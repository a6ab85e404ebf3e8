use sha2::{Digest, Sha256};

use crate::constants::SHA256_DIGEST_LEN;

pub fn sha256sum(data: &[u8]) -> [u8; SHA256_DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0; SHA256_DIGEST_LEN];
    output.copy_from_slice(&result);
    output
}
