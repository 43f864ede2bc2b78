use anyhow::{Result, anyhow};
use blst::{
    BLST_ERROR,
    min_sig::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature},
};

use crate::bls::constants::{BLS_PUBLIC_KEY_BYTES, BLS_SECRET_KEY_BYTES, BLS_SIGNATURE_BYTES};

/// Generates a BLS secret key and returns encoded secret-key bytes.
pub fn generate_secret_key_bytes<R: rand::CryptoRng + rand::RngCore>(
    rng: &mut R,
) -> [u8; BLS_SECRET_KEY_BYTES] {
    let mut ikm = [0u8; BLS_SECRET_KEY_BYTES];
    rng.fill_bytes(&mut ikm);
    SecretKey::key_gen(&ikm, &[])
        .expect("Failed to generate BLS secret key")
        .to_bytes()
}

/// Derives compressed public key bytes from encoded secret key bytes.
pub fn public_key_from_secret_key_bytes(
    secret_key_bytes: &[u8; BLS_SECRET_KEY_BYTES],
) -> Result<[u8; BLS_PUBLIC_KEY_BYTES]> {
    let sk = SecretKey::from_bytes(secret_key_bytes)
        .map_err(|e| anyhow!("Invalid BLS secret key bytes: {:?}", e))?;
    Ok(sk.sk_to_pk().to_bytes())
}

/// Signs a message under the given domain separation tag and returns
/// compressed signature bytes.
pub fn sign_with_secret_key_bytes(
    secret_key_bytes: &[u8; BLS_SECRET_KEY_BYTES],
    message: &[u8],
    dst: &[u8],
) -> Result<[u8; BLS_SIGNATURE_BYTES]> {
    let sk = SecretKey::from_bytes(secret_key_bytes)
        .map_err(|e| anyhow!("Invalid BLS secret key bytes: {:?}", e))?;
    Ok(sk.sign(message, dst, &[]).to_bytes())
}

/// Verifies compressed signature bytes against compressed public key bytes.
///
/// Both the signature subgroup check and public key validation are enabled.
/// The core verifies signatures produced by untrusted peers, so neither
/// check is ever skipped.
pub fn verify_signature_bytes(
    public_key_bytes: &[u8; BLS_PUBLIC_KEY_BYTES],
    message: &[u8],
    signature_bytes: &[u8; BLS_SIGNATURE_BYTES],
    dst: &[u8],
) -> Result<()> {
    let pk = PublicKey::from_bytes(public_key_bytes)
        .map_err(|e| anyhow!("Invalid BLS public key bytes: {:?}", e))?;
    let sig = Signature::from_bytes(signature_bytes)
        .map_err(|e| anyhow!("Invalid BLS signature bytes: {:?}", e))?;

    let result = sig.verify(true, message, dst, &[], &pk, true);
    if result == BLST_ERROR::BLST_SUCCESS {
        Ok(())
    } else {
        Err(anyhow!("Signature verification failed: {:?}", result))
    }
}

/// Runs the full `KeyValidate` routine on compressed public key bytes:
/// deserialization, on-curve check, subgroup check, and rejection of the
/// point at infinity.
pub fn validate_public_key_bytes(public_key_bytes: &[u8; BLS_PUBLIC_KEY_BYTES]) -> Result<()> {
    PublicKey::key_validate(public_key_bytes)
        .map(|_| ())
        .map_err(|e| anyhow!("BLS public key validation failed: {:?}", e))
}

/// Aggregates compressed signatures into a single compressed signature.
///
/// Every input is group-checked before aggregation.
///
/// # Errors
/// Returns an error when the input is empty or any signature fails to
/// deserialize or is not in G1.
pub fn aggregate_signature_bytes(
    signatures: &[[u8; BLS_SIGNATURE_BYTES]],
) -> Result<[u8; BLS_SIGNATURE_BYTES]> {
    if signatures.is_empty() {
        return Err(anyhow!("Cannot aggregate empty signature set"));
    }

    let mut parsed = Vec::with_capacity(signatures.len());
    for (idx, bytes) in signatures.iter().enumerate() {
        let sig = Signature::from_bytes(bytes)
            .map_err(|e| anyhow!("Invalid signature at index {idx}: {:?}", e))?;
        parsed.push(sig);
    }
    let refs: Vec<&Signature> = parsed.iter().collect();

    let aggregate = AggregateSignature::aggregate(&refs, true)
        .map_err(|e| anyhow!("Signature aggregation failed: {:?}", e))?;
    Ok(aggregate.to_signature().to_bytes())
}

/// Aggregates compressed public keys into a single compressed public key.
///
/// Every input is validated before aggregation.
///
/// # Errors
/// Returns an error when the input is empty or any public key fails to
/// deserialize or is not in G2.
pub fn aggregate_public_key_bytes(
    public_keys: &[[u8; BLS_PUBLIC_KEY_BYTES]],
) -> Result<[u8; BLS_PUBLIC_KEY_BYTES]> {
    if public_keys.is_empty() {
        return Err(anyhow!("Cannot aggregate empty public key set"));
    }

    let mut parsed = Vec::with_capacity(public_keys.len());
    for (idx, bytes) in public_keys.iter().enumerate() {
        let pk = PublicKey::from_bytes(bytes)
            .map_err(|e| anyhow!("Invalid public key at index {idx}: {:?}", e))?;
        parsed.push(pk);
    }
    let refs: Vec<&PublicKey> = parsed.iter().collect();

    let aggregate = AggregatePublicKey::aggregate(&refs, true)
        .map_err(|e| anyhow!("Public key aggregation failed: {:?}", e))?;
    Ok(aggregate.to_public_key().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::constants::{DST_POP, DST_SIG};
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn secret_key_roundtrip_sign_verify() {
        let mut rng = StdRng::seed_from_u64(17);
        let sk = generate_secret_key_bytes(&mut rng);
        let pk = public_key_from_secret_key_bytes(&sk).expect("pk");
        let msg = b"ops-sign-verify";
        let sig = sign_with_secret_key_bytes(&sk, msg, DST_SIG).expect("sig");
        verify_signature_bytes(&pk, msg, &sig, DST_SIG).expect("verify");
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let mut rng = StdRng::seed_from_u64(18);
        let sk = generate_secret_key_bytes(&mut rng);
        let pk = public_key_from_secret_key_bytes(&sk).expect("pk");
        let sig = sign_with_secret_key_bytes(&sk, b"msg-a", DST_SIG).expect("sig");
        let result = verify_signature_bytes(&pk, b"msg-b", &sig, DST_SIG);
        assert!(result.is_err());
    }

    #[test]
    fn verify_rejects_wrong_dst() {
        let mut rng = StdRng::seed_from_u64(19);
        let sk = generate_secret_key_bytes(&mut rng);
        let pk = public_key_from_secret_key_bytes(&sk).expect("pk");
        let msg = b"dst-separation";
        let sig = sign_with_secret_key_bytes(&sk, msg, DST_SIG).expect("sig");
        let result = verify_signature_bytes(&pk, msg, &sig, DST_POP);
        assert!(result.is_err());
    }

    #[test]
    fn verify_rejects_invalid_public_key_bytes() {
        let mut rng = StdRng::seed_from_u64(20);
        let sk = generate_secret_key_bytes(&mut rng);
        let msg = b"msg";
        let sig = sign_with_secret_key_bytes(&sk, msg, DST_SIG).expect("sig");
        let bad_pk = [0u8; BLS_PUBLIC_KEY_BYTES];
        let result = verify_signature_bytes(&bad_pk, msg, &sig, DST_SIG);
        assert!(result.is_err());
    }

    #[test]
    fn verify_rejects_invalid_signature_bytes() {
        let mut rng = StdRng::seed_from_u64(21);
        let sk = generate_secret_key_bytes(&mut rng);
        let pk = public_key_from_secret_key_bytes(&sk).expect("pk");
        let bad_sig = [0u8; BLS_SIGNATURE_BYTES];
        let result = verify_signature_bytes(&pk, b"msg", &bad_sig, DST_SIG);
        assert!(result.is_err());
    }

    #[test]
    fn validate_public_key_rejects_zeroed_bytes() {
        let bad_pk = [0u8; BLS_PUBLIC_KEY_BYTES];
        assert!(validate_public_key_bytes(&bad_pk).is_err());
    }

    #[test]
    fn aggregate_signatures_rejects_empty() {
        let result = aggregate_signature_bytes(&[]);
        assert!(result.is_err());
    }

    #[test]
    fn aggregate_public_keys_rejects_empty() {
        let result = aggregate_public_key_bytes(&[]);
        assert!(result.is_err());
    }

    #[test]
    fn aggregated_signature_verifies_under_aggregated_public_key() {
        let mut rng = StdRng::seed_from_u64(22);
        let msg = b"aggregate-roundtrip";

        let mut sigs = Vec::new();
        let mut pks = Vec::new();
        for _ in 0..3 {
            let sk = generate_secret_key_bytes(&mut rng);
            pks.push(public_key_from_secret_key_bytes(&sk).expect("pk"));
            sigs.push(sign_with_secret_key_bytes(&sk, msg, DST_SIG).expect("sig"));
        }

        let multi_sig = aggregate_signature_bytes(&sigs).expect("aggregate sigs");
        let aggr_pk = aggregate_public_key_bytes(&pks).expect("aggregate pks");
        verify_signature_bytes(&aggr_pk, msg, &multi_sig, DST_SIG).expect("verify multi");
    }

    #[test]
    fn aggregation_is_order_independent() {
        let mut rng = StdRng::seed_from_u64(23);
        let msg = b"order-independent";

        let mut sigs = Vec::new();
        for _ in 0..3 {
            let sk = generate_secret_key_bytes(&mut rng);
            sigs.push(sign_with_secret_key_bytes(&sk, msg, DST_SIG).expect("sig"));
        }

        let forward = aggregate_signature_bytes(&sigs).expect("forward");
        sigs.reverse();
        let backward = aggregate_signature_bytes(&sigs).expect("backward");
        assert_eq!(forward, backward);
    }
}
