//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies (the ledger node, the mirror database, the clock)
//! are abstracted behind traits. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (hold mining, inject failures)
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod store;

pub use chain::NullChain;
pub use clock::NullClock;
pub use store::NullMirrorStore;
