//! Deterministic generators of signed transactions and block bodies.

use crate::{
    public_key_to_address, Address, BlockHash, BlockNumber, Bytes, ChainId, ChainSpec, Signature,
    Transaction, TransactionSigned, B256, U256,
};
use rand::Rng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

/// Sign `message` with `secret`, returning the recoverable signature parts.
pub fn sign_message(secret: &SecretKey, message: B256) -> Signature {
    let secp = Secp256k1::new();
    let msg = Message::from_slice(message.as_slice()).expect("message is 32 bytes");
    let (rec_id, data) = secp.sign_ecdsa_recoverable(&msg, secret).serialize_compact();
    Signature {
        r: B256::from_slice(&data[..32]),
        s: B256::from_slice(&data[32..64]),
        odd_y_parity: rec_id.to_i32() != 0,
    }
}

/// Generate a transaction signed by a fresh random key.
///
/// Returns the signed transaction and the address recovery is expected to
/// yield for it.
pub fn random_signed_tx<R: Rng>(rng: &mut R, chain_id: Option<ChainId>) -> (TransactionSigned, Address) {
    let secret = SecretKey::new(rng);
    let transaction = Transaction {
        chain_id,
        nonce: rng.gen_range(0..10_000),
        gas_price: rng.gen_range(1..=u64::MAX as u128),
        gas_limit: rng.gen_range(21_000..1_000_000),
        to: rng.gen_bool(0.9).then(|| Address::from(rng.gen::<[u8; 20]>())),
        value: U256::from(rng.gen::<u64>()),
        input: Bytes::from(rng.gen::<[u8; 16]>().to_vec()),
    };
    let signature = sign_message(&secret, transaction.signature_hash());
    let sender = public_key_to_address(PublicKey::from_secret_key(&Secp256k1::new(), &secret));
    (TransactionSigned::new(transaction, signature), sender)
}

/// Generate a block body with `tx_count` signed transactions, using the
/// chain id the spec expects at `number`.
///
/// Returns the body and the senders recovery is expected to yield, in
/// transaction order.
pub fn random_body<R: Rng>(
    rng: &mut R,
    spec: &ChainSpec,
    number: BlockNumber,
    tx_count: usize,
) -> (crate::BlockBody, Vec<Address>) {
    let signer = spec.signer(number);
    let chain_id = signer.replay_protected().then(|| signer.chain_id());

    let mut transactions = Vec::with_capacity(tx_count);
    let mut senders = Vec::with_capacity(tx_count);
    for _ in 0..tx_count {
        let (tx, sender) = random_signed_tx(rng, chain_id);
        transactions.push(tx);
        senders.push(sender);
    }
    (crate::BlockBody { transactions }, senders)
}

/// A random block hash.
pub fn random_hash<R: Rng>(rng: &mut R) -> BlockHash {
    B256::from(rng.gen::<[u8; 32]>())
}
