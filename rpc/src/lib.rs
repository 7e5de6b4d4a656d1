//! HTTP API for the certchain node.
//!
//! Provides endpoints for:
//! - Issuing and revoking certificates
//! - Verifying a certificate against the chain
//! - The applied-event feed, mirrored certificates and admins
//! - Admin management and transaction lookups
//! - Health and Prometheus metrics

pub mod error;
pub mod handlers;
pub mod pagination;
pub mod server;

pub use error::RpcError;
pub use server::{AppState, RpcConfig, RpcServer};
