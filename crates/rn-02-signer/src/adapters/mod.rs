//! Adapters layer: AWS KMS transport and its request signing.

pub mod aws_kms;
pub mod sigv4;
