//! certchain node: keeps the off-chain mirror in step with the registry.
//!
//! The node is the central coordinator that:
//! - Polls the registry's lifecycle events and applies them to the mirror
//! - Reconciles mirror records against the chain on every verification
//! - Issues, revokes and verifies certificates on behalf of API callers
//! - Manages admin authorization changes
//!
//! Every component is constructed once and shared by `Arc`; nothing here
//! holds global state.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod poller;
pub mod reconciler;
pub mod service;
pub mod shutdown;
pub mod tracing_spans;

pub use config::{NodeConfig, SecretKeyHex, StartBlock};
pub use error::{NodeError, ServiceError};
pub use logging::{init_logging, LogFormat};
pub use metrics::MirrorMetrics;
pub use poller::{EventPoller, PollReport, PollerConfig, PollerPhase};
pub use reconciler::{Reconciler, VerifiedCertificate};
pub use service::{CertificateService, IssueOutcome};
pub use shutdown::ShutdownController;
