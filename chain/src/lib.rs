//! Chain gateway for the certificate registry contract.
//!
//! - [`abi`]: ABI encoding and the registry's JSON ABI
//! - [`rlp`] / [`transaction`]: EIP-155 legacy transaction signing
//! - [`transport`]: the async node interface, with a JSON-RPC implementation in [`jsonrpc`]
//! - [`gateway`]: nonce management, simulation, receipt waiting and event decoding

pub mod abi;
pub mod error;
pub mod gateway;
pub mod jsonrpc;
pub mod rlp;
pub mod transaction;
pub mod transport;

pub use abi::{ContractAbi, Token};
pub use error::ChainError;
pub use gateway::{
    ChainEvent, ChainGateway, EventPayload, GatewayConfig, OnChainCertificate, TransactionStatus,
    DEFAULT_GAS_LIMIT, DEFAULT_RECEIPT_POLL_INTERVAL, DEFAULT_TX_TIMEOUT,
};
pub use jsonrpc::JsonRpcTransport;
pub use transaction::{decode_signed, DecodedTransaction, SignedTransaction, TransactionRequest};
pub use transport::{CallRequest, ChainTransport, Log, LogFilter, Receipt};
