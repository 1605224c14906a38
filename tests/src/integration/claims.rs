//! # Claim Scenarios
//!
//! Claims submitted by someone else, claims the machine disagrees with and
//! claims broadcast by a claimer that crashed before recording them.

#[cfg(test)]
mod tests {
    use primitive_types::U256;
    use rn_01_repository::Repository;
    use rn_02_signer::{LegacyTransaction, Signer, Transaction};
    use shared_l1::{ConsensusContract, EthClient};
    use shared_types::{AdvanceResult, EpochStatus, Hash, InputCompletionStatus};

    use crate::integration::fixtures::{Node, APP, CHAIN_ID, CONSENSUS, HARDHAT_KEY};

    #[tokio::test]
    async fn test_duplicate_claim_is_detected() {
        let mut node = Node::start().await;
        node.emit(17, 0, b"payload");
        node.set_latest(22);
        node.compute_claims().await;
        let epoch = node.epoch(0).await;
        let claim = epoch.claim_hash.unwrap();

        assert_eq!(node.claimer.restore_in_flight().await.unwrap(), 1);
        let external: Hash = [0xee; 32];
        node.claim_submitted_on_chain(claim, epoch.last_block, 21, external);

        let summary = node.claimer.tick().await.unwrap();

        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.submitted, 0);
        assert!(node.chain.sent_transactions().is_empty());
        let epoch = node.epoch(0).await;
        assert_eq!(epoch.status, EpochStatus::ClaimSubmitted);
        assert_eq!(epoch.transaction_hash, Some(external));
        assert_eq!(node.metrics.duplicate_claims(), 1);
    }

    #[tokio::test]
    async fn test_claim_mismatch_halts_validator() {
        let mut node = Node::start().await;
        node.emit(17, 0, b"payload");
        node.set_latest(22);
        node.reader.tick().await.unwrap();

        let mut reported = [0u8; 32];
        reported[..4].copy_from_slice(&[0xca, 0xfe, 0xba, 0xbe]);
        let input = node.repo.get_input(APP, 0).await.unwrap().unwrap();
        node.repo
            .store_advance_result(
                &input,
                &AdvanceResult {
                    status: InputCompletionStatus::Accepted,
                    outputs: vec![b"payload".to_vec()],
                    reports: Vec::new(),
                    outputs_hash: reported,
                    machine_hash: Some([0x01; 32]),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            node.repo.promote_closed_epochs_fully_processed(APP).await.unwrap(),
            1
        );

        let err = node.validator.tick().await.unwrap_err();

        assert!(err.to_string().contains("claim does not match"));
        let epoch = node.epoch(0).await;
        assert_eq!(epoch.status, EpochStatus::ProcessedAllInputs);
        assert_eq!(epoch.claim_hash, None);

        let summary = node.claimer.tick().await.unwrap();
        assert_eq!(summary.submitted, 0);
    }

    #[tokio::test]
    async fn test_restarted_claimer_adopts_earlier_broadcast() {
        let mut node = Node::start().await;
        node.emit(17, 0, b"payload");
        node.set_latest(22);
        node.compute_claims().await;
        let epoch = node.epoch(0).await;
        let claim = epoch.claim_hash.unwrap();

        // A previous run broadcast the claim, then died before the update.
        let signer = Signer::from_private_key(HARDHAT_KEY).unwrap();
        let tx = Transaction::Legacy(LegacyTransaction {
            nonce: 0,
            gas_price: U256::from(1_000_000_000u64),
            gas_limit: 120_000,
            to: CONSENSUS,
            value: U256::zero(),
            data: ConsensusContract::submit_claim_calldata(APP, epoch.last_block, claim),
        });
        let signed = signer.sign_transaction(&tx, CHAIN_ID).await.unwrap();
        let broadcast = node.chain.send_raw_transaction(&signed.raw).await.unwrap();
        assert_eq!(broadcast, signed.hash);
        node.claim_submitted_on_chain(claim, epoch.last_block, 22, signed.hash);

        node.claimer.restore_in_flight().await.unwrap();
        let summary = node.claimer.tick().await.unwrap();

        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.reconciled, 1);
        assert_eq!(node.chain.sent_transactions().len(), 1);
        let epoch = node.epoch(0).await;
        assert_eq!(epoch.status, EpochStatus::ClaimSubmitted);
        assert_eq!(epoch.transaction_hash, Some(signed.hash));
    }
}
