//! Validator signed checkpoints.
//!
//! A checkpoint commits to the root of the origin merkle tree hook after a message was inserted at
//! `index`. Validators sign the EIP-191 hash of the checkpoint digest and publish the result as
//! JSON to their announced storage location.

use super::CheckpointError;
use alloy::primitives::{Address, B256, Bytes, Signature, U256, eip191_hash_message, keccak256};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use serde::{Deserialize, Serialize};

/// Length of a serialized `R || S || V` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// A merkle tree hook checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The merkle tree hook, as a 32 byte word.
    pub merkle_tree_hook_address: B256,
    /// Hyperlane domain of the origin mailbox.
    pub mailbox_domain: u32,
    /// Merkle root.
    pub root: B256,
    /// Index of the last leaf.
    pub index: u32,
}

impl Checkpoint {
    /// `keccak256(be32(domain) || hook || "HYPERLANE")`
    pub fn domain_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(4 + 32 + 9);
        buf.extend_from_slice(&self.mailbox_domain.to_be_bytes());
        buf.extend_from_slice(self.merkle_tree_hook_address.as_slice());
        buf.extend_from_slice(b"HYPERLANE");
        keccak256(buf)
    }
}

/// A checkpoint together with the id of the message at its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointWithMessageId {
    /// The checkpoint.
    pub checkpoint: Checkpoint,
    /// Id of the message inserted at `checkpoint.index`.
    pub message_id: B256,
}

impl CheckpointWithMessageId {
    /// `keccak256(domain_hash || root || be32(index) || message_id)`
    pub fn digest(&self) -> B256 {
        let mut buf = Vec::with_capacity(32 + 32 + 4 + 32);
        buf.extend_from_slice(self.checkpoint.domain_hash().as_slice());
        buf.extend_from_slice(self.checkpoint.root.as_slice());
        buf.extend_from_slice(&self.checkpoint.index.to_be_bytes());
        buf.extend_from_slice(self.message_id.as_slice());
        keccak256(buf)
    }

    /// The hash validators sign: the EIP-191 personal message hash of [`Self::digest`].
    pub fn signing_hash(&self) -> B256 {
        eip191_hash_message(self.digest())
    }
}

/// Signature components as written by validators.
///
/// `r` and `s` are written as quantities, so leading zero bytes may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureParts {
    /// R.
    pub r: U256,
    /// S.
    pub s: U256,
    /// Recovery id, either `0/1` or `27/28`.
    pub v: u64,
}

impl SignatureParts {
    /// Reads the parts of a 65 byte `R || S || V` signature.
    pub fn from_serialized(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SIGNATURE_LENGTH {
            return None;
        }
        Some(Self {
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..64]),
            v: bytes[64] as u64,
        })
    }

    /// Returns the signature with the recovery id normalized to a parity bit.
    pub fn signature(&self) -> Result<Signature, CheckpointError> {
        let parity = match self.v {
            0 | 27 => false,
            1 | 28 => true,
            v => return Err(CheckpointError::InvalidRecoveryId(v)),
        };
        Ok(Signature::new(self.r, self.s, parity))
    }

    /// Serializes the signature as `R || S || V` with `V` in `27/28`.
    pub fn to_bytes(&self) -> Result<[u8; SIGNATURE_LENGTH], CheckpointError> {
        let signature = self.signature()?;
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
        bytes[64] = 27 + signature.v() as u8;
        Ok(bytes)
    }
}

/// A checkpoint signed by one validator, as stored in its checkpoint storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCheckpointWithMessageId {
    /// Signed value.
    pub value: CheckpointWithMessageId,
    /// Signature components.
    pub signature: SignatureParts,
    /// The full `R || S || V` signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized_signature: Option<Bytes>,
}

impl SignedCheckpointWithMessageId {
    /// Index of the checkpoint.
    pub fn index(&self) -> u32 {
        self.value.checkpoint.index
    }

    /// Root of the checkpoint.
    pub fn root(&self) -> B256 {
        self.value.checkpoint.root
    }

    /// Replaces the signature components with the ones read from the serialized signature.
    ///
    /// Some validator versions strip zero bytes from `r` and `s` but write the serialized
    /// signature intact. Returns false, leaving the checkpoint untouched, if there is no well
    /// formed serialized signature.
    pub fn repair_signature(&mut self) -> bool {
        let parts = self
            .serialized_signature
            .as_ref()
            .and_then(|serialized| SignatureParts::from_serialized(serialized));
        match parts {
            Some(parts) => {
                self.signature = parts;
                true
            }
            None => false,
        }
    }

    /// Recovers the signer address and checks the signature against the recovered key.
    pub fn recover(&self) -> Result<Address, CheckpointError> {
        let hash = self.value.signing_hash();
        let signature = self.signature.signature()?;
        let key = signature.recover_from_prehash(&hash)?;

        let ecdsa = k256::ecdsa::Signature::from_scalars(
            k256::FieldBytes::from(signature.r().to_be_bytes::<32>()),
            k256::FieldBytes::from(signature.s().to_be_bytes::<32>()),
        )?;
        key.verify_prehash(hash.as_slice(), &ecdsa)?;

        Ok(Address::from_public_key(&key))
    }

    /// Checks that the checkpoint was signed by `validator`.
    pub fn verify(&self, validator: Address) -> Result<(), CheckpointError> {
        let recovered = self.recover()?;
        if recovered != validator {
            return Err(CheckpointError::SignerMismatch { expected: validator, recovered });
        }
        Ok(())
    }
}
