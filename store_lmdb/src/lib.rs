//! LMDB storage backend for the certchain mirror store.
//!
//! Implements every trait from `certchain-store` on [`LmdbEnvironment`]
//! using the `heed` LMDB bindings. Each logical store maps to one named
//! database within a single environment; every record mutation runs in its
//! own write transaction, so a crash never leaves a half-merged record.

pub mod admin;
pub mod certificate;
pub mod cursor;
pub mod environment;
pub mod error;
pub mod event_log;
pub mod meta;
pub mod migration;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};
