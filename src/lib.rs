//! Ledgerchain - an append-only account ledger with periodic snapshots
//!
//! # Architecture
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, snapshots, stores, balance resolution and validation
//! - [`transaction`] - Signed change requests and the state transitions they produce
//!
//! ## Cryptography & Encoding
//! - [`crypto`] - Account keys and signatures (secp256k1)
//! - [`encoding`] - Canonical encoding and hashing
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration and chain file loading
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Cryptography & Encoding
// ============================================================================
pub mod crypto;
pub mod encoding;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
