//! # KMS Signer Round-Trip
//!
//! A KMS-held key must sign exactly like the same key held locally, both in
//! isolation and when it drives a full claim submission.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
    use primitive_types::U256;
    use rn_02_signer::{Eip1559Transaction, MockKmsClient, Signer, Transaction};
    use shared_types::{decode_hex, EpochStatus};

    use crate::integration::fixtures::{Node, CHAIN_ID, CONSENSUS, HARDHAT_KEY};

    const KEY_ID: &str = "alias/claimer";

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&decode_hex(HARDHAT_KEY).unwrap()).unwrap()
    }

    async fn kms_signer() -> Signer {
        let client = Arc::new(MockKmsClient::new(KEY_ID, signing_key()));
        Signer::remote_kms(client, KEY_ID).await.unwrap()
    }

    fn transaction() -> Transaction {
        Transaction::Eip1559(Eip1559Transaction {
            nonce: 7,
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            max_fee_per_gas: U256::from(3_000_000_000u64),
            gas_limit: 120_000,
            to: CONSENSUS,
            value: U256::zero(),
            data: vec![0x6c, 0x1f, 0x0e, 0x8a],
        })
    }

    #[tokio::test]
    async fn test_kms_signature_recovers_exactly_once() {
        let public_key = *signing_key().verifying_key();
        let signer = kms_signer().await;
        let tx = transaction();
        let digest = tx.signing_hash(CHAIN_ID);

        let recoverable = signer.sign_digest(&digest).await.unwrap();

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&recoverable.r);
        bytes[32..].copy_from_slice(&recoverable.s);
        let signature = Signature::from_slice(&bytes).unwrap();
        assert!(signature.normalize_s().is_none(), "s must be in the lower half");

        let recovering: Vec<u8> = (0u8..=1)
            .filter(|v| {
                let id = RecoveryId::from_byte(*v).unwrap();
                VerifyingKey::recover_from_prehash(&digest, &signature, id)
                    .is_ok_and(|key| key == public_key)
            })
            .collect();
        assert_eq!(recovering, vec![recoverable.recovery_id]);
    }

    #[tokio::test]
    async fn test_kms_transaction_matches_local() {
        let tx = transaction();
        let remote = kms_signer().await.sign_transaction(&tx, CHAIN_ID).await.unwrap();
        let local = Signer::from_private_key(HARDHAT_KEY)
            .unwrap()
            .sign_transaction(&tx, CHAIN_ID)
            .await
            .unwrap();

        assert_eq!(remote.hash, local.hash);
        assert_eq!(remote.raw, local.raw);
    }

    #[tokio::test]
    async fn test_kms_node_submits_same_claim_transaction() {
        let mut remote = Node::with_signer(kms_signer().await).await;
        let mut local = Node::start().await;
        for node in [&mut remote, &mut local] {
            node.emit(17, 0, b"payload");
            node.set_latest(22);
            node.step().await;
            assert_eq!(node.epoch(0).await.status, EpochStatus::ClaimSubmitted);
        }

        assert_eq!(
            remote.chain.sent_transactions(),
            local.chain.sent_transactions()
        );
    }
}
