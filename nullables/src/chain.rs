//! Nullable ledger: an in-memory certificate registry behind `ChainTransport`.
//!
//! Executes the registry's calldata (decoded through the ABI), keeps per
//! sender nonces, mines one block per accepted transaction, and emits the
//! same logs the deployed contract would. Tests can hold mining, inject
//! transport failures, and read the ledger directly.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use certchain_chain::abi::{encode, Token};
use certchain_chain::{
    decode_signed, CallRequest, ChainError, ChainGateway, ChainTransport, ContractAbi,
    DecodedTransaction, GatewayConfig, Log, LogFilter, Receipt,
};
use certchain_crypto::AdminKey;
use certchain_types::{Address, Digest, RecoverableSignature, Timestamp, TxHash};

use crate::NullClock;

pub const NULL_CHAIN_ID: u64 = 31337;
pub const NULL_CONTRACT: Address = Address::new([0xC0; 20]);
pub const NULL_GAS_PRICE: u128 = 1_000_000_000;
const BLOCK_TIME_SECS: u64 = 12;
const GAS_PER_TX: u64 = 21_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerCertificate {
    pub recipient_hash: Digest,
    pub course_hash: Digest,
    pub issue_date: Timestamp,
    pub signature: RecoverableSignature,
    pub revoked: bool,
}

enum Effect {
    Issue { id: String, cert: LedgerCertificate },
    Revoke { id: String },
    AddAdmin(Address),
    RemoveAdmin(Address),
    Read(Vec<u8>),
}

struct Block {
    timestamp: Timestamp,
}

struct LedgerState {
    blocks: Vec<Block>,
    certificates: HashMap<String, LedgerCertificate>,
    admins: BTreeSet<Address>,
    nonces: HashMap<Address, u64>,
    held: Vec<DecodedTransaction>,
    receipts: HashMap<TxHash, Receipt>,
    logs: Vec<Log>,
    nonce_rejections: u64,
    hold_mining: bool,
    revocation_flag: bool,
}

pub struct NullChain {
    abi: ContractAbi,
    clock: NullClock,
    state: Mutex<LedgerState>,
    failing_calls: AtomicU32,
    failing_broadcasts: AtomicU32,
}

impl NullChain {
    /// A fresh ledger whose registry has `owner` as its only admin.
    pub fn new(owner: Address) -> Self {
        let abi = ContractAbi::bundled().expect("bundled ABI parses");
        let clock = NullClock::new(1_700_000_000);
        let genesis = Block {
            timestamp: clock.now(),
        };
        Self {
            abi,
            clock,
            state: Mutex::new(LedgerState {
                blocks: vec![genesis],
                certificates: HashMap::new(),
                admins: BTreeSet::from([owner]),
                nonces: HashMap::new(),
                held: Vec::new(),
                receipts: HashMap::new(),
                logs: Vec::new(),
                nonce_rejections: 0,
                hold_mining: false,
                revocation_flag: false,
            }),
            failing_calls: AtomicU32::new(0),
            failing_broadcasts: AtomicU32::new(0),
        }
    }

    /// A gateway wired to this ledger with short timeouts for tests.
    pub fn gateway(self: &Arc<Self>, key: AdminKey) -> ChainGateway {
        let mut config = GatewayConfig::new(NULL_CONTRACT);
        config.chain_id = Some(NULL_CHAIN_ID);
        config.tx_timeout = Duration::from_secs(5);
        config.receipt_poll_interval = Duration::from_millis(5);
        self.gateway_with(key, config)
    }

    pub fn gateway_with(self: &Arc<Self>, key: AdminKey, config: GatewayConfig) -> ChainGateway {
        let transport: Arc<dyn ChainTransport> = self.clone();
        ChainGateway::new(transport, self.abi.clone(), key, config)
    }

    /// Keep accepted transactions pending until [`NullChain::mine_pending`].
    pub fn hold_mining(&self, hold: bool) {
        self.state.lock().unwrap().hold_mining = hold;
    }

    /// Mine every held transaction into one block.
    pub fn mine_pending(&self) {
        let mut state = self.state.lock().unwrap();
        let held = std::mem::take(&mut state.held);
        for tx in &held {
            *state.nonces.entry(tx.from).or_insert(0) += 1;
        }
        self.mine(&mut state, held);
    }

    pub fn mine_empty_blocks(&self, n: u64) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            self.mine(&mut state, Vec::new());
        }
    }

    /// Mine a block holding a single registry log with arbitrary topics and
    /// data, returning the block number.
    pub fn mine_raw_log(&self, topics: Vec<Digest>, data: Vec<u8>) -> u64 {
        let mut state = self.state.lock().unwrap();
        self.mine(&mut state, Vec::new());
        let block_number = state.blocks.len() as u64 - 1;
        let mut tx_hash = [0xEE; 32];
        tx_hash[24..].copy_from_slice(&block_number.to_be_bytes());
        state.logs.push(Log {
            address: NULL_CONTRACT,
            topics,
            data,
            block_number,
            log_index: 0,
            tx_hash: TxHash::new(tx_hash),
        });
        block_number
    }

    /// Make the next `n` transport calls fail with a network error.
    pub fn fail_next(&self, n: u32) {
        self.failing_calls.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `eth_sendRawTransaction` calls fail with a network error.
    pub fn fail_broadcasts(&self, n: u32) {
        self.failing_broadcasts.store(n, Ordering::SeqCst);
    }

    /// Return the six-field `verifyCertificate` shape with a revocation flag.
    pub fn report_revocation_flag(&self, enabled: bool) {
        self.state.lock().unwrap().revocation_flag = enabled;
    }

    pub fn nonce_rejections(&self) -> u64 {
        self.state.lock().unwrap().nonce_rejections
    }

    pub fn head(&self) -> u64 {
        self.state.lock().unwrap().blocks.len() as u64 - 1
    }

    pub fn certificate(&self, id: &str) -> Option<LedgerCertificate> {
        self.state.lock().unwrap().certificates.get(id).cloned()
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.state.lock().unwrap().admins.contains(address)
    }

    pub fn log_count(&self) -> usize {
        self.state.lock().unwrap().logs.len()
    }

    fn check_failure(&self) -> Result<(), ChainError> {
        consume_failure(&self.failing_calls)
    }

    fn mine(&self, state: &mut LedgerState, txs: Vec<DecodedTransaction>) {
        self.clock.advance(BLOCK_TIME_SECS);
        let number = state.blocks.len() as u64;
        let timestamp = self.clock.now();
        state.blocks.push(Block { timestamp });

        let mut log_index = 0;
        for tx in txs {
            let (success, logs) = match self.evaluate(state, tx.from, &tx.request.data, timestamp) {
                Ok(effect) => {
                    let logs = self.apply(state, effect);
                    (true, logs)
                }
                Err(reason) => {
                    tracing::debug!(tx_hash = %tx.hash, %reason, "null ledger reverted transaction");
                    (false, Vec::new())
                }
            };
            let logs: Vec<Log> = logs
                .into_iter()
                .map(|(topics, data)| {
                    let log = Log {
                        address: NULL_CONTRACT,
                        topics,
                        data,
                        block_number: number,
                        log_index,
                        tx_hash: tx.hash,
                    };
                    log_index += 1;
                    log
                })
                .collect();
            state.logs.extend(logs.iter().cloned());
            state.receipts.insert(
                tx.hash,
                Receipt {
                    tx_hash: tx.hash,
                    block_number: number,
                    success,
                    gas_used: GAS_PER_TX,
                    logs,
                },
            );
        }
    }

    /// Run a registry call against the current state without changing it.
    fn evaluate(
        &self,
        state: &LedgerState,
        from: Address,
        calldata: &[u8],
        now: Timestamp,
    ) -> Result<Effect, String> {
        let function = self
            .abi
            .function_for_calldata(calldata)
            .ok_or_else(|| "unknown selector".to_string())?;
        let args = function.decode_input(calldata).map_err(|e| e.to_string())?;
        let require_admin = || {
            if state.admins.contains(&from) {
                Ok(())
            } else {
                Err("Only admin can perform this action".to_string())
            }
        };
        let string_arg = |i: usize| match args.get(i) {
            Some(Token::String(s)) => Ok(s.clone()),
            _ => Err(format!("argument {i} is not a string")),
        };
        let address_arg = |i: usize| {
            args.get(i)
                .and_then(Token::to_address)
                .ok_or_else(|| format!("argument {i} is not an address"))
        };

        match function.name.as_str() {
            "issueCertificate" => {
                require_admin()?;
                let id = string_arg(0)?;
                if id.is_empty() {
                    return Err("Certificate ID is required".into());
                }
                if state.certificates.contains_key(&id) {
                    return Err("Certificate already exists".into());
                }
                let digest_arg = |i: usize| {
                    args.get(i)
                        .and_then(Token::to_digest)
                        .ok_or_else(|| format!("argument {i} is not bytes32"))
                };
                let signature = match args.get(3) {
                    Some(Token::Bytes(b)) => {
                        RecoverableSignature::from_slice(b).map_err(|e| e.to_string())?
                    }
                    _ => return Err("argument 3 is not bytes".into()),
                };
                Ok(Effect::Issue {
                    id,
                    cert: LedgerCertificate {
                        recipient_hash: digest_arg(1)?,
                        course_hash: digest_arg(2)?,
                        issue_date: now,
                        signature,
                        revoked: false,
                    },
                })
            }
            "revokeCertificate" => {
                require_admin()?;
                let id = string_arg(0)?;
                match state.certificates.get(&id) {
                    None => Err("Certificate does not exist".into()),
                    Some(cert) if cert.revoked => Err("Certificate already revoked".into()),
                    Some(_) => Ok(Effect::Revoke { id }),
                }
            }
            "addAdmin" => {
                require_admin()?;
                let admin = address_arg(0)?;
                if state.admins.contains(&admin) {
                    return Err("Already an admin".into());
                }
                Ok(Effect::AddAdmin(admin))
            }
            "removeAdmin" => {
                require_admin()?;
                let admin = address_arg(0)?;
                if !state.admins.contains(&admin) {
                    return Err("Not an admin".into());
                }
                Ok(Effect::RemoveAdmin(admin))
            }
            "verifyCertificate" => {
                let id = string_arg(0)?;
                let cert = state
                    .certificates
                    .get(&id)
                    .ok_or_else(|| "Certificate does not exist".to_string())?;
                let mut fields = vec![
                    Token::String(id),
                    Token::FixedBytes(cert.recipient_hash.as_bytes().to_vec()),
                    Token::FixedBytes(cert.course_hash.as_bytes().to_vec()),
                    Token::Uint(u128::from(cert.issue_date.as_secs())),
                    Token::Bytes(cert.signature.as_bytes().to_vec()),
                ];
                if state.revocation_flag {
                    fields.push(Token::Bool(cert.revoked));
                }
                Ok(Effect::Read(encode(&fields)))
            }
            "admins" => {
                let admin = address_arg(0)?;
                Ok(Effect::Read(encode(&[Token::Bool(state.admins.contains(&admin))])))
            }
            other => Err(format!("{other} is not implemented by the null ledger")),
        }
    }

    /// Apply a state change, returning the `(topics, data)` of emitted logs.
    fn apply(&self, state: &mut LedgerState, effect: Effect) -> Vec<(Vec<Digest>, Vec<u8>)> {
        let emit = |name: &str, args: &[Token]| -> Vec<(Vec<Digest>, Vec<u8>)> {
            match self.abi.event(name).and_then(|e| e.encode_log(args)) {
                Ok(log) => vec![log],
                Err(e) => {
                    tracing::warn!(event = name, error = %e, "null ledger could not encode log");
                    Vec::new()
                }
            }
        };
        match effect {
            Effect::Issue { id, cert } => {
                let logs = emit(
                    "CertificateIssued",
                    &[
                        Token::String(id.clone()),
                        Token::FixedBytes(cert.recipient_hash.as_bytes().to_vec()),
                        Token::FixedBytes(cert.course_hash.as_bytes().to_vec()),
                        Token::Uint(u128::from(cert.issue_date.as_secs())),
                        Token::Bytes(cert.signature.as_bytes().to_vec()),
                    ],
                );
                state.certificates.insert(id, cert);
                logs
            }
            Effect::Revoke { id } => {
                let logs = emit("CertificateRevoked", &[Token::String(id.clone())]);
                if let Some(cert) = state.certificates.get_mut(&id) {
                    cert.revoked = true;
                }
                logs
            }
            Effect::AddAdmin(admin) => {
                state.admins.insert(admin);
                emit("AdminAdded", &[Token::Address(admin)])
            }
            Effect::RemoveAdmin(admin) => {
                state.admins.remove(&admin);
                emit("AdminRemoved", &[Token::Address(admin)])
            }
            Effect::Read(_) => Vec::new(),
        }
    }

    fn next_nonce(state: &LedgerState, address: &Address) -> u64 {
        let confirmed = state.nonces.get(address).copied().unwrap_or(0);
        let held = state.held.iter().filter(|tx| tx.from == *address).count() as u64;
        confirmed + held
    }
}

fn consume_failure(counter: &AtomicU32) -> Result<(), ChainError> {
    match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
        Ok(_) => Err(ChainError::Network("injected transport failure".into())),
        Err(_) => Ok(()),
    }
}

#[async_trait]
impl ChainTransport for NullChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.check_failure()?;
        Ok(NULL_CHAIN_ID)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.check_failure()?;
        Ok(self.head())
    }

    async fn block_timestamp(&self, number: u64) -> Result<Timestamp, ChainError> {
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        usize::try_from(number)
            .ok()
            .and_then(|n| state.blocks.get(n))
            .map(|b| b.timestamp)
            .ok_or_else(|| ChainError::NotFound(format!("block {number}")))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        self.check_failure()?;
        Ok(NULL_GAS_PRICE)
    }

    async fn pending_nonce(&self, address: &Address) -> Result<u64, ChainError> {
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        Ok(Self::next_nonce(&state, address))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        self.check_failure()?;
        consume_failure(&self.failing_broadcasts)?;
        let tx = decode_signed(raw).map_err(|e| ChainError::Rpc {
            code: -32602,
            message: format!("invalid transaction: {e}"),
        })?;
        let mut state = self.state.lock().unwrap();

        if tx.request.chain_id != NULL_CHAIN_ID {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "invalid chain id".into(),
            });
        }
        let expected = Self::next_nonce(&state, &tx.from);
        if tx.request.nonce != expected {
            state.nonce_rejections += 1;
            let message = if tx.request.nonce < expected {
                "nonce too low"
            } else {
                "nonce too high"
            };
            return Err(ChainError::Rpc {
                code: -32000,
                message: message.into(),
            });
        }

        let hash = tx.hash;
        if state.hold_mining {
            state.held.push(tx);
        } else {
            *state.nonces.entry(tx.from).or_insert(0) += 1;
            self.mine(&mut state, vec![tx]);
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        self.check_failure()?;
        Ok(self.state.lock().unwrap().receipts.get(hash).cloned())
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError> {
        self.check_failure()?;
        if request.to != NULL_CONTRACT {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        let from = request.from.unwrap_or(Address::ZERO);
        match self.evaluate(&state, from, &request.data, self.clock.now()) {
            Ok(Effect::Read(output)) => Ok(output),
            Ok(_) => Ok(Vec::new()),
            Err(reason) => Err(ChainError::Reverted { reason }),
        }
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.address == filter.address
                    && log.topics.first() == Some(&filter.topic)
                    && (filter.from_block..=filter.to_block).contains(&log.block_number)
            })
            .cloned()
            .collect())
    }
}
