//! Message id multisig ism metadata.
//!
//! Layout, without padding or length prefixes:
//!
//! | bytes | field |
//! |---|---|
//! | `0..32` | merkle tree hook address |
//! | `32..64` | checkpoint root |
//! | `64..68` | checkpoint index, big endian |
//! | `68..` | `R || S || V` signatures, 65 bytes each |

use super::{checkpoint::SIGNATURE_LENGTH, quorum::MultisigSignedCheckpoint};
use alloy::primitives::Bytes;

/// Length of the fixed metadata header.
pub const METADATA_HEADER_LENGTH: usize = 32 + 32 + 4;

/// Encodes the metadata proving `quorum` to a message id multisig ism.
pub fn encode_metadata(quorum: &MultisigSignedCheckpoint) -> Bytes {
    let checkpoint = &quorum.checkpoint.checkpoint;

    let mut metadata =
        Vec::with_capacity(METADATA_HEADER_LENGTH + SIGNATURE_LENGTH * quorum.signatures.len());
    metadata.extend_from_slice(checkpoint.merkle_tree_hook_address.as_slice());
    metadata.extend_from_slice(checkpoint.root.as_slice());
    metadata.extend_from_slice(&checkpoint.index.to_be_bytes());
    for signature in &quorum.signatures {
        metadata.extend_from_slice(&signature.signature);
    }

    metadata.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperlane::{
        checkpoint::{Checkpoint, CheckpointWithMessageId},
        quorum::ValidatorSignature,
    };
    use alloy::primitives::{Address, B256};

    fn quorum(signatures: usize) -> MultisigSignedCheckpoint {
        MultisigSignedCheckpoint {
            checkpoint: CheckpointWithMessageId {
                checkpoint: Checkpoint {
                    merkle_tree_hook_address: B256::repeat_byte(0x11),
                    mailbox_domain: 1,
                    root: B256::repeat_byte(0x22),
                    index: 0x0102_0304,
                },
                message_id: B256::repeat_byte(0x33),
            },
            signatures: (0..signatures)
                .map(|i| ValidatorSignature {
                    validator: Address::repeat_byte(i as u8),
                    signature: [i as u8; SIGNATURE_LENGTH],
                })
                .collect(),
        }
    }

    #[test]
    fn metadata_length() {
        for n in 0..5 {
            assert_eq!(encode_metadata(&quorum(n)).len(), 68 + 65 * n);
        }
    }

    #[test]
    fn metadata_layout() {
        let metadata = encode_metadata(&quorum(2));

        assert_eq!(&metadata[..32], B256::repeat_byte(0x11).as_slice());
        assert_eq!(&metadata[32..64], B256::repeat_byte(0x22).as_slice());
        assert_eq!(&metadata[64..68], &[1, 2, 3, 4]);
        assert_eq!(&metadata[68..133], &[0u8; 65]);
        assert_eq!(&metadata[133..], &[1u8; 65]);
    }
}
