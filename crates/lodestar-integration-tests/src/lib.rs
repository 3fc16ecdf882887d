//! Integration test crate for Lodestar.
//!
//! This crate has no library code. It only contains integration tests
//! that exercise notification flows across multiple workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p lodestar-integration-tests
//! ```
