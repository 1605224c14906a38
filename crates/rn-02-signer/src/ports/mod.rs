//! Ports layer: the KMS the signer drives.

pub mod outbound;
