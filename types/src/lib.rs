//! Fundamental types for certchain.
//!
//! This crate defines the value types shared by every other crate in the
//! workspace: certificate identifiers, 32-byte digests, account addresses,
//! recoverable signatures, timestamps and the four ledger event kinds.

#[macro_use]
mod bytes;

pub mod address;
pub mod certificate;
pub mod error;
pub mod event;
pub mod hash;
pub mod signature;
pub mod time;

pub use address::Address;
pub use certificate::CertificateId;
pub use error::TypesError;
pub use event::{EventKind, EventPosition};
pub use hash::{Digest, TxHash};
pub use signature::RecoverableSignature;
pub use time::Timestamp;
