//! # Pipeline Scenarios
//!
//! Inputs flow from `InputAdded` logs to submitted and accepted claims.

#[cfg(test)]
mod tests {
    use rn_01_repository::Repository;
    use rn_05_validator::claim_hash;
    use shared_crypto::{compute_root_from_siblings, keccak256, MAX_OUTPUT_TREE_HEIGHT};
    use shared_types::{EpochStatus, InputCompletionStatus};

    use crate::integration::fixtures::{Node, APP};

    const PAYLOAD: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

    // =============================================================================
    // SINGLE INPUT
    // =============================================================================

    #[tokio::test]
    async fn test_echo_single_input_single_epoch() {
        let mut node = Node::start().await;
        node.emit(17, 0, &PAYLOAD);
        node.set_latest(22);

        for _ in 0..10 {
            node.step().await;
            if node.epoch(0).await.status >= EpochStatus::ClaimSubmitted {
                break;
            }
        }

        let input = node.repo.get_input(APP, 0).await.unwrap().unwrap();
        assert_eq!(input.index, 0);
        assert_eq!(input.status, InputCompletionStatus::Accepted);

        let outputs = node.repo.get_outputs_by_input(input.id).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].index, 0);
        assert_eq!(outputs[0].raw_data, PAYLOAD.to_vec());

        let epoch = node.epoch(0).await;
        assert_eq!(epoch.status, EpochStatus::ClaimSubmitted);
        let sent = node.chain.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(epoch.transaction_hash, Some(keccak256(&sent[0])));
    }

    #[tokio::test]
    async fn test_claim_commits_to_proven_outputs() {
        let mut node = Node::start().await;
        node.emit(17, 0, b"first");
        node.emit(18, 0, b"second");
        node.emit(22, 0, b"third");
        node.set_latest(27);
        node.compute_claims().await;

        for index in 0..2 {
            let epoch = node.epoch(index).await;
            assert_eq!(epoch.status, EpochStatus::ClaimComputed);
            let last_input = node.repo.get_last_input(&epoch).await.unwrap().unwrap();
            let machine_hash = last_input.machine_hash.unwrap();

            let outputs = node
                .repo
                .get_outputs_produced_in_block_range(APP, epoch.first_block, epoch.last_block)
                .await
                .unwrap();
            assert!(!outputs.is_empty());
            for output in outputs {
                assert_eq!(output.output_hashes_siblings.len(), MAX_OUTPUT_TREE_HEIGHT);
                let leaf = output.hash.unwrap();
                assert_eq!(leaf, keccak256(&output.raw_data));
                let root =
                    compute_root_from_siblings(leaf, output.index, &output.output_hashes_siblings);
                assert_eq!(Some(claim_hash(&root, &machine_hash)), epoch.claim_hash);
            }
        }
    }

    #[tokio::test]
    async fn test_submitted_claim_is_accepted() {
        let mut node = Node::start().await;
        node.emit(17, 0, &PAYLOAD);
        node.set_latest(22);
        node.step().await;
        let epoch = node.epoch(0).await;
        let claim = epoch.claim_hash.unwrap();

        node.claim_accepted_on_chain(claim, epoch.last_block, 23, [0xab; 32]);
        node.set_latest(24);
        node.step().await;

        let epoch = node.epoch(0).await;
        assert_eq!(epoch.status, EpochStatus::ClaimAccepted);
        assert_eq!(node.chain.sent_transactions().len(), 1);
    }

    // =============================================================================
    // EMPTY EPOCHS
    // =============================================================================

    #[tokio::test]
    async fn test_empty_epoch_claim_equals_previous() {
        let mut node = Node::start().await;
        node.emit(17, 0, &PAYLOAD);
        node.set_latest(27);
        node.compute_claims().await;

        let first = node.epoch(0).await;
        let second = node.epoch(1).await;
        assert_eq!(second.status, EpochStatus::ClaimComputed);
        assert!(first.claim_hash.is_some());
        assert_eq!(second.claim_hash, first.claim_hash);

        let own_outputs = node
            .repo
            .get_outputs_produced_in_block_range(APP, second.first_block, second.last_block)
            .await
            .unwrap();
        assert!(own_outputs.is_empty());
        let all_outputs = node
            .repo
            .get_outputs_produced_in_block_range(APP, first.first_block, second.last_block)
            .await
            .unwrap();
        assert_eq!(all_outputs.len(), 1);

        let summary = node.claimer.tick().await.unwrap();
        assert_eq!(summary.submitted, 2);
    }

    // =============================================================================
    // ORDERING & IDEMPOTENCE
    // =============================================================================

    #[tokio::test]
    async fn test_inputs_keep_emission_order() {
        let mut node = Node::start().await;
        node.emit(17, 0, b"a");
        node.emit(18, 0, b"b");
        node.emit(18, 1, b"c");
        node.emit(19, 0, b"d");
        node.set_latest(26);

        node.reader.tick().await.unwrap();

        let expected = [(17, b"a"), (18, b"b"), (18, b"c"), (19, b"d")];
        for (index, (block, payload)) in expected.iter().enumerate() {
            let input = node
                .repo
                .get_input(APP, index as u64)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(input.block_number, *block);
            assert_eq!(&input.raw_data, payload);
        }
        assert_eq!(node.repo.get_input_count(APP).await.unwrap(), 4);
        assert_eq!(node.repo.get_last_processed_block(APP).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_idle_workers_change_nothing() {
        let mut node = Node::start().await;
        node.emit(17, 0, &PAYLOAD);
        node.set_latest(22);
        node.step().await;
        assert_eq!(node.epoch(0).await.status, EpochStatus::ClaimSubmitted);

        let before = node.repo.snapshot();
        node.step().await;
        assert_eq!(node.advancer.tick().await.unwrap(), 0);
        assert_eq!(node.validator.tick().await.unwrap(), 0);
        assert_eq!(node.repo.snapshot(), before);
        assert_eq!(node.chain.sent_transactions().len(), 1);
        assert_eq!(node.machines.advanced(APP), 1);
    }
}
