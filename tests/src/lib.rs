//! # Rollups Node Test Suite
//!
//! End-to-end scenarios wiring every worker against the in-memory
//! repository, the mock L1 node and the echo machine.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs   # Node harness
//!     ├── pipeline.rs   # Inputs to submitted claims
//!     ├── claims.rs     # Duplicate and mismatching claims
//!     └── signer.rs     # KMS round-trip
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rn-tests
//! cargo test -p rn-tests integration::claims::
//! ```

pub mod integration;
