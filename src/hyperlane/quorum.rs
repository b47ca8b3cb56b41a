//! Validator quorum search.

use super::{
    RelayError,
    checkpoint::{CheckpointWithMessageId, SIGNATURE_LENGTH},
    fetcher::CheckpointFetcher,
};
use crate::metrics::ValidatorMetrics;
use alloy::primitives::{Address, B256};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// A validator signature over a quorum checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorSignature {
    /// The signing validator.
    pub validator: Address,
    /// `R || S || V` with `V` in `27/28`.
    pub signature: [u8; SIGNATURE_LENGTH],
}

/// A checkpoint signed by at least a threshold of validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSignedCheckpoint {
    /// The checkpoint all signatures commit to the root of.
    pub checkpoint: CheckpointWithMessageId,
    /// Signatures, in the order they were found.
    pub signatures: Vec<ValidatorSignature>,
}

/// Searches the validators for a root at `index` signed by at least `threshold` of them.
///
/// Validators are queried one at a time and the search stops as soon as a root reaches the
/// threshold. A validator that has not signed the index, signed another index, or whose
/// signature does not verify is skipped.
pub async fn find_quorum(
    fetchers: &[Arc<dyn CheckpointFetcher>],
    index: u32,
    threshold: usize,
) -> Result<MultisigSignedCheckpoint, RelayError> {
    let threshold = threshold.max(1);
    let mut roots: HashMap<B256, MultisigSignedCheckpoint> = HashMap::new();

    for fetcher in fetchers {
        let validator = fetcher.validator();

        let signed = match fetcher.checkpoint(index).await {
            Ok(Some(signed)) => signed,
            Ok(None) => {
                debug!(%validator, index, "Validator has not signed checkpoint");
                continue;
            }
            Err(err) => {
                warn!(%validator, index, %err, "Failed to fetch checkpoint");
                ValidatorMetrics::for_validator(validator).checkpointing_errors.increment(1);
                continue;
            }
        };

        if signed.index() != index {
            warn!(%validator, index, got = signed.index(), "Checkpoint index mismatch");
            ValidatorMetrics::for_validator(validator).checkpointing_errors.increment(1);
            continue;
        }

        let signature = match signed.verify(validator).and_then(|_| signed.signature.to_bytes()) {
            Ok(signature) => signature,
            Err(err) => {
                warn!(%validator, index, %err, "Invalid checkpoint signature");
                ValidatorMetrics::for_validator(validator).checkpointing_errors.increment(1);
                continue;
            }
        };

        let entry = roots.entry(signed.root()).or_insert_with(|| MultisigSignedCheckpoint {
            checkpoint: signed.value,
            signatures: Vec::new(),
        });
        entry.signatures.push(ValidatorSignature { validator, signature });

        if entry.signatures.len() >= threshold {
            debug!(index, root = %signed.root(), signatures = entry.signatures.len(), "Found quorum");
            return Ok(entry.clone());
        }
    }

    let found = roots.values().map(|quorum| quorum.signatures.len()).max().unwrap_or_default();
    warn!(index, threshold, found, "Not enough signatures found");
    Err(RelayError::NotEnoughSignaturesFound { index, threshold, found })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hyperlane::checkpoint::{Checkpoint, SignedCheckpointWithMessageId},
        test_utils::{MockFetcher, sign_checkpoint},
    };
    use alloy::signers::local::PrivateKeySigner;

    fn value(root: B256, index: u32) -> CheckpointWithMessageId {
        CheckpointWithMessageId {
            checkpoint: Checkpoint {
                merkle_tree_hook_address: B256::repeat_byte(1),
                mailbox_domain: 42161,
                root,
                index,
            },
            message_id: B256::repeat_byte(9),
        }
    }

    fn fetcher(
        signer: &PrivateKeySigner,
        checkpoint: Option<SignedCheckpointWithMessageId>,
    ) -> Arc<dyn CheckpointFetcher> {
        Arc::new(MockFetcher::new(signer.address()).with_checkpoint(checkpoint))
    }

    #[tokio::test]
    async fn selects_root_with_threshold_signatures() {
        let root_x = B256::repeat_byte(0xaa);
        let root_y = B256::repeat_byte(0xbb);
        let signers: Vec<_> = (0..5).map(|_| PrivateKeySigner::random()).collect();

        let fetchers = vec![
            fetcher(&signers[0], Some(sign_checkpoint(&signers[0], value(root_y, 7)))),
            fetcher(&signers[1], Some(sign_checkpoint(&signers[1], value(root_x, 7)))),
            fetcher(&signers[2], None),
            fetcher(&signers[3], Some(sign_checkpoint(&signers[3], value(root_x, 7)))),
            fetcher(&signers[4], Some(sign_checkpoint(&signers[4], value(root_x, 7)))),
        ];

        let quorum = find_quorum(&fetchers, 7, 2).await.unwrap();
        assert_eq!(quorum.checkpoint.checkpoint.root, root_x);
        assert_eq!(
            quorum.signatures.iter().map(|s| s.validator).collect::<Vec<_>>(),
            vec![signers[1].address(), signers[3].address()]
        );
    }

    #[tokio::test]
    async fn skips_invalid_checkpoints() {
        let root = B256::repeat_byte(0xaa);
        let signers: Vec<_> = (0..4).map(|_| PrivateKeySigner::random()).collect();

        let mut tampered = sign_checkpoint(&signers[1], value(root, 7));
        tampered.signature.s ^= alloy::primitives::U256::from(1);

        let fetchers = vec![
            // wrong index
            fetcher(&signers[0], Some(sign_checkpoint(&signers[0], value(root, 6)))),
            fetcher(&signers[1], Some(tampered)),
            // signed by someone else than the validator it is served for
            fetcher(&signers[2], Some(sign_checkpoint(&signers[3], value(root, 7)))),
            fetcher(&signers[3], Some(sign_checkpoint(&signers[3], value(root, 7)))),
        ];

        let err = find_quorum(&fetchers, 7, 2).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::NotEnoughSignaturesFound { index: 7, threshold: 2, found: 1 }
        ));

        let quorum = find_quorum(&fetchers, 7, 1).await.unwrap();
        assert_eq!(quorum.signatures[0].validator, signers[3].address());
    }

    #[tokio::test]
    async fn split_roots_do_not_reach_threshold() {
        let signers: Vec<_> = (0..3).map(|_| PrivateKeySigner::random()).collect();
        let fetchers: Vec<_> = signers
            .iter()
            .enumerate()
            .map(|(i, signer)| {
                fetcher(signer, Some(sign_checkpoint(signer, value(B256::repeat_byte(i as u8), 7))))
            })
            .collect();

        assert!(matches!(
            find_quorum(&fetchers, 7, 2).await,
            Err(RelayError::NotEnoughSignaturesFound { found: 1, .. })
        ));
        assert!(matches!(
            find_quorum(&[], 7, 1).await,
            Err(RelayError::NotEnoughSignaturesFound { found: 0, .. })
        ));
    }
}
