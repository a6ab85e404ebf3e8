use anyhow::{anyhow, Context};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

// verify_p256_signature_bytes verifies a P256 ECDSA signature
// using the provided data, signature, and public key.
// The data is the message that was signed as a byte slice.
// The signature is the signature (in raw form [r][s]) of the data as a byte slice. (64 bytes)
// The public_key is the public key (in uncompressed form [4][x][y]) of the entity that signed the data. (65 bytes)
pub fn verify_p256_signature_bytes(
    data: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> anyhow::Result<()> {
    let signature = Signature::from_slice(signature).context("invalid p256 signature encoding")?;
    let verifying_key =
        VerifyingKey::from_sec1_bytes(public_key).context("invalid p256 public key")?;
    verifying_key
        .verify(data, &signature)
        .map_err(|e| anyhow!("p256 signature verification failed: {e}"))
}

/// Quotes carry attestation keys as raw [x][y] coordinates; SEC1 wants the
/// uncompressed tag in front.
pub fn sec1_from_raw_p256(raw: &[u8; 64]) -> [u8; 65] {
    let mut key = [0u8; 65];
    key[0] = 4;
    key[1..].copy_from_slice(raw);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn verify_raw_signature() {
        let signing_key = SigningKey::random(&mut OsRng);
        let signature: Signature = signing_key.sign(b"quote body");
        let point = signing_key.verifying_key().to_encoded_point(false);

        verify_p256_signature_bytes(b"quote body", &signature.to_bytes(), point.as_bytes())
            .unwrap();
        assert!(verify_p256_signature_bytes(
            b"quote b0dy",
            &signature.to_bytes(),
            point.as_bytes()
        )
        .is_err());
    }

    #[test]
    fn rejects_malformed_key() {
        let signing_key = SigningKey::random(&mut OsRng);
        let signature: Signature = signing_key.sign(b"data");
        assert!(verify_p256_signature_bytes(b"data", &signature.to_bytes(), &[4u8; 10]).is_err());
    }
}
