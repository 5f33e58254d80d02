use crate::{keccak256, Address, B256};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, Secp256k1,
};

/// An error recovering the signer of a transaction from its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("could not recover signer from signature: {0}")]
pub struct SignatureError(#[from] secp256k1::Error);

/// An exclusively owned secp256k1 context used for sender recovery.
///
/// The context is deliberately not shareable: each recovery worker owns
/// exactly one for the duration of a stage run.
#[derive(Debug)]
pub struct RecoveryContext {
    inner: Secp256k1<secp256k1::All>,
}

impl RecoveryContext {
    /// Create a fresh context.
    pub fn new() -> Self {
        Self { inner: Secp256k1::new() }
    }

    /// Recovers the address of the sender using secp256k1 pubkey recovery.
    ///
    /// Converts the public key into an address by hashing the public key with
    /// keccak256.
    pub fn recover_signer(&self, sig: &[u8; 65], msg: &B256) -> Result<Address, SignatureError> {
        let sig =
            RecoverableSignature::from_compact(&sig[0..64], RecoveryId::from_i32(sig[64] as i32)?)?;
        let public = self.inner.recover_ecdsa(&Message::from_slice(msg.as_slice())?, &sig)?;
        Ok(public_key_to_address(public))
    }
}

impl Default for RecoveryContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a public key into an address by hashing the encoded public key
/// with keccak256.
pub fn public_key_to_address(public: PublicKey) -> Address {
    // strip out the first byte because that should be the SECP256K1_TAG_PUBKEY_UNCOMPRESSED
    // tag returned by libsecp's uncompressed pubkey serialization
    let hash = keccak256(&public.serialize_uncompressed()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use hex_literal::hex;

    #[test]
    fn sanity_ecrecover_call() {
        let sig = hex!("650acf9d3f5f0a2c799776a1254355d5f4061762a237396a99a0e0e3fc2bcd6729514a0dacb2e623ac4abd157cb18163ff942280db4d5caad66ddf941ba12e0300");
        let hash = B256::new(hex!(
            "47173285a8d7341e5e972fc677286384f802f8ef42a5ec5f03bbfa254cb01fad"
        ));
        let out = address!("c08b5542d177ac6686946920409741463a15dddb");

        let ctx = RecoveryContext::new();
        assert_eq!(ctx.recover_signer(&sig, &hash), Ok(out));
    }

    #[test]
    fn rejects_bad_recovery_id() {
        let mut sig = [0u8; 65];
        sig[64] = 9;
        let ctx = RecoveryContext::new();
        assert!(ctx.recover_signer(&sig, &B256::ZERO).is_err());
    }
}
