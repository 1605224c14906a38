//! # Transactions
//!
//! Unsigned transaction bodies and their RLP encodings.
//!
//! | Kind | Signing payload | Signed envelope |
//! |------|-----------------|-----------------|
//! | Legacy (EIP-155) | `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])` | `rlp([..., v, r, s])`, `v = recid + 2 * chainId + 35` |
//! | EIP-1559 | `0x02 \|\| rlp([chainId, nonce, tip, maxFee, gas, to, value, data, []])` | `0x02 \|\| rlp([..., yParity, r, s])` |

use primitive_types::U256;
use rlp::RlpStream;
use shared_crypto::keccak256;
use shared_types::{Address, Hash};

const EIP1559_TYPE: u8 = 0x02;

/// Pre-EIP-1559 transaction, replay-protected with EIP-155.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

/// Dynamic-fee transaction with an empty access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Legacy(LegacyTransaction),
    Eip1559(Eip1559Transaction),
}

/// `(r, s)` with `s` in the lower half of the curve order, plus the
/// recovery id (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

/// Broadcast-ready bytes and their transaction hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: Hash,
}

impl Transaction {
    /// The digest the signer signs.
    pub fn signing_hash(&self, chain_id: u64) -> Hash {
        keccak256(&self.signing_payload(chain_id))
    }

    fn signing_payload(&self, chain_id: u64) -> Vec<u8> {
        match self {
            Transaction::Legacy(tx) => {
                let mut stream = RlpStream::new_list(9);
                tx.append_body(&mut stream);
                stream.append(&chain_id);
                stream.append(&0u8);
                stream.append(&0u8);
                stream.out().to_vec()
            }
            Transaction::Eip1559(tx) => {
                let mut stream = RlpStream::new_list(9);
                tx.append_body(&mut stream, chain_id);
                typed(EIP1559_TYPE, stream.out().as_ref())
            }
        }
    }

    /// Attach a signature and produce the broadcast encoding.
    pub fn encode_signed(
        &self,
        chain_id: u64,
        signature: &RecoverableSignature,
    ) -> SignedTransaction {
        let r = U256::from_big_endian(&signature.r);
        let s = U256::from_big_endian(&signature.s);

        let raw = match self {
            Transaction::Legacy(tx) => {
                let v = u64::from(signature.recovery_id) + chain_id * 2 + 35;
                let mut stream = RlpStream::new_list(9);
                tx.append_body(&mut stream);
                stream.append(&v);
                stream.append(&r);
                stream.append(&s);
                stream.out().to_vec()
            }
            Transaction::Eip1559(tx) => {
                let mut stream = RlpStream::new_list(12);
                tx.append_body(&mut stream, chain_id);
                stream.append(&signature.recovery_id);
                stream.append(&r);
                stream.append(&s);
                typed(EIP1559_TYPE, stream.out().as_ref())
            }
        };

        SignedTransaction {
            hash: keccak256(&raw),
            raw,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Transaction::Legacy(tx) => tx.nonce,
            Transaction::Eip1559(tx) => tx.nonce,
        }
    }
}

impl LegacyTransaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to.to_vec());
        stream.append(&self.value);
        stream.append(&self.data);
    }
}

impl Eip1559Transaction {
    fn append_body(&self, stream: &mut RlpStream, chain_id: u64) {
        stream.append(&chain_id);
        stream.append(&self.nonce);
        stream.append(&self.max_priority_fee_per_gas);
        stream.append(&self.max_fee_per_gas);
        stream.append(&self.gas_limit);
        stream.append(&self.to.to_vec());
        stream.append(&self.value);
        stream.append(&self.data);
        stream.begin_list(0);
    }
}

fn typed(tx_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(tx_type);
    out.extend_from_slice(payload);
    out
}
