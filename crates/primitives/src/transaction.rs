use crate::{keccak256, Address, Bytes, ChainId, TxHash, B256, U256};
use alloy_rlp::{length_of_length, BufMut, Decodable, Encodable, Header, EMPTY_STRING_CODE};

/// A legacy-shape transaction.
///
/// A transaction carrying a chain id commits to that chain in its signing
/// payload and is therefore replay protected; one without a chain id predates
/// replay protection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    /// The chain this transaction committed to, if replay protected.
    pub chain_id: Option<ChainId>,
    /// Nonce of the sender account at signing time.
    pub nonce: u64,
    /// Price the sender is willing to pay per unit of gas.
    pub gas_price: u128,
    /// Gas the transaction may consume.
    pub gas_limit: u64,
    /// The recipient, or `None` for a contract creation.
    pub to: Option<Address>,
    /// Value transferred with the call.
    pub value: U256,
    /// Call data.
    pub input: Bytes,
}

impl Transaction {
    /// Whether the transaction commits to a chain id.
    pub const fn is_protected(&self) -> bool {
        self.chain_id.is_some()
    }

    /// The hash the sender signed over.
    ///
    /// Replay-protected transactions append `[chain_id, 0, 0]` to the signing
    /// payload.
    pub fn signature_hash(&self) -> B256 {
        let mut buf = Vec::new();
        self.encode_for_signing(&mut buf);
        keccak256(&buf)
    }

    fn encode_for_signing(&self, out: &mut dyn BufMut) {
        let mut payload_length = self.fields_len();
        if let Some(chain_id) = self.chain_id {
            payload_length += chain_id.length() + 2;
        }
        Header { list: true, payload_length }.encode(out);
        self.encode_fields(out);
        if let Some(chain_id) = self.chain_id {
            chain_id.encode(out);
            0u8.encode(out);
            0u8.encode(out);
        }
    }

    pub(crate) fn fields_len(&self) -> usize {
        self.nonce.length() +
            self.gas_price.length() +
            self.gas_limit.length() +
            to_length(&self.to) +
            self.value.length() +
            self.input.length()
    }

    pub(crate) fn encode_fields(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        encode_to(&self.to, out);
        self.value.encode(out);
        self.input.encode(out);
    }
}

/// An ECDSA signature over a transaction's signing payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signature {
    /// The R field of the signature.
    pub r: B256,
    /// The S field of the signature.
    pub s: B256,
    /// Parity of the Y coordinate of the recovered public key point.
    pub odd_y_parity: bool,
}

impl Signature {
    /// The 65-byte compact form consumed by the recovery context.
    pub fn to_compact(self) -> [u8; 65] {
        let mut sig = [0u8; 65];
        sig[..32].copy_from_slice(self.r.as_slice());
        sig[32..64].copy_from_slice(self.s.as_slice());
        sig[64] = self.odd_y_parity as u8;
        sig
    }

    fn payload_len(&self) -> usize {
        self.odd_y_parity.length() + self.r.length() + self.s.length()
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.odd_y_parity.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }
}

/// A signed transaction together with its recovered sender, if any.
///
/// The sender field starts out empty and is populated by the sender recovery
/// stage when the enriched body is written back to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSigned {
    /// The transaction payload.
    pub transaction: Transaction,
    /// The signature over the payload.
    pub signature: Signature,
    /// The sender recovered from the signature.
    pub sender: Option<Address>,
}

impl TransactionSigned {
    /// Pair a transaction with its signature. The sender starts out unset.
    pub const fn new(transaction: Transaction, signature: Signature) -> Self {
        Self { transaction, signature, sender: None }
    }

    /// Record the recovered sender.
    pub fn set_sender(&mut self, sender: Address) {
        self.sender = Some(sender);
    }

    /// The transaction hash, keyed by payload and signature.
    pub fn hash(&self) -> TxHash {
        let payload_length = self.transaction.fields_len() + self.signature.payload_len();
        let mut buf = Vec::with_capacity(payload_length + length_of_length(payload_length));
        Header { list: true, payload_length }.encode(&mut buf);
        self.transaction.encode_fields(&mut buf);
        self.signature.encode_fields(&mut buf);
        keccak256(&buf)
    }

    fn payload_len(&self) -> usize {
        self.transaction.chain_id.unwrap_or(0).length() +
            self.transaction.fields_len() +
            self.signature.payload_len() +
            to_length(&self.sender)
    }
}

impl Encodable for TransactionSigned {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_len() }.encode(out);
        // chain id zero marks an unprotected transaction
        self.transaction.chain_id.unwrap_or(0).encode(out);
        self.transaction.encode_fields(out);
        self.signature.encode_fields(out);
        encode_to(&self.sender, out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_len();
        payload_length + length_of_length(payload_length)
    }
}

impl Decodable for TransactionSigned {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        if buf.len() < header.payload_length {
            return Err(alloy_rlp::Error::InputTooShort)
        }
        let mut payload = &buf[..header.payload_length];
        *buf = &buf[header.payload_length..];

        let chain_id = u64::decode(&mut payload)?;
        let transaction = Transaction {
            chain_id: (chain_id != 0).then_some(chain_id),
            nonce: u64::decode(&mut payload)?,
            gas_price: u128::decode(&mut payload)?,
            gas_limit: u64::decode(&mut payload)?,
            to: decode_to(&mut payload)?,
            value: U256::decode(&mut payload)?,
            input: Bytes::decode(&mut payload)?,
        };
        let signature = Signature {
            odd_y_parity: bool::decode(&mut payload)?,
            r: B256::decode(&mut payload)?,
            s: B256::decode(&mut payload)?,
        };
        let sender = decode_to(&mut payload)?;
        if !payload.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength)
        }
        Ok(Self { transaction, signature, sender })
    }
}

// An optional address encodes as the empty string when absent, mirroring the
// `to` field of a contract creation.
fn encode_to(to: &Option<Address>, out: &mut dyn BufMut) {
    match to {
        Some(address) => address.encode(out),
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

fn to_length(to: &Option<Address>) -> usize {
    match to {
        Some(address) => address.length(),
        None => 1,
    }
}

fn decode_to(buf: &mut &[u8]) -> alloy_rlp::Result<Option<Address>> {
    let first = *buf.first().ok_or(alloy_rlp::Error::InputTooShort)?;
    if first == EMPTY_STRING_CODE {
        *buf = &buf[1..];
        Ok(None)
    } else {
        Ok(Some(Address::decode(buf)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn sample_tx(chain_id: Option<ChainId>) -> Transaction {
        Transaction {
            chain_id,
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Some(address!("3535353535353535353535353535353535353535")),
            value: U256::from(1_000_000_000_000_000_000u128),
            input: Bytes::new(),
        }
    }

    #[test]
    fn protected_signing_payload_commits_to_chain_id() {
        let unprotected = sample_tx(None);
        let mainnet = sample_tx(Some(1));
        let other = sample_tx(Some(2));

        assert_ne!(unprotected.signature_hash(), mainnet.signature_hash());
        assert_ne!(mainnet.signature_hash(), other.signature_hash());
    }

    #[test]
    fn signed_tx_storage_roundtrip() {
        let signature = Signature {
            r: B256::repeat_byte(0x11),
            s: B256::repeat_byte(0x22),
            odd_y_parity: true,
        };
        let mut signed = TransactionSigned::new(sample_tx(Some(1)), signature);

        let mut encoded = Vec::new();
        signed.encode(&mut encoded);
        assert_eq!(encoded.len(), signed.length());
        assert_eq!(TransactionSigned::decode(&mut encoded.as_slice()).unwrap(), signed);

        // the sender survives the codec once recovery has run
        signed.set_sender(address!("c08b5542d177ac6686946920409741463a15dddb"));
        let mut encoded = Vec::new();
        signed.encode(&mut encoded);
        let decoded = TransactionSigned::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.sender, signed.sender);
    }

    #[test]
    fn contract_creation_roundtrip() {
        let mut tx = sample_tx(None);
        tx.to = None;
        let signed = TransactionSigned::new(tx, Signature::default());

        let mut encoded = Vec::new();
        signed.encode(&mut encoded);
        assert_eq!(TransactionSigned::decode(&mut encoded.as_slice()).unwrap(), signed);
    }

    #[test]
    fn hash_ignores_recovered_sender() {
        let signed = TransactionSigned::new(sample_tx(Some(1)), Signature::default());
        let mut with_sender = signed.clone();
        with_sender.set_sender(address!("c08b5542d177ac6686946920409741463a15dddb"));
        assert_eq!(signed.hash(), with_sender.hash());
    }
}
