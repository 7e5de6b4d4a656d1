//! The chain gateway: every interaction with the certificate registry.
//!
//! Writes go through [`ChainGateway::submit`], which simulates the call,
//! then signs and broadcasts under the nonce lock, then waits for the
//! receipt with the lock released. Reads are plain `eth_call`s.

use std::sync::Arc;
use std::time::Duration;

use certchain_crypto::{hash_text, sign_certificate, AdminKey};
use certchain_types::{
    Address, CertificateId, Digest, EventKind, EventPosition, RecoverableSignature, Timestamp,
    TxHash,
};
use tokio::sync::{Mutex, OnceCell};

use crate::abi::{ContractAbi, Function, Token};
use crate::transaction::TransactionRequest;
use crate::transport::{CallRequest, ChainTransport, Log, LogFilter, Receipt};
use crate::ChainError;

pub const DEFAULT_GAS_LIMIT: u64 = 2_000_000;
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub contract: Address,
    /// Queried from the node on first use when unset.
    pub chain_id: Option<u64>,
    pub gas_limit: u64,
    pub tx_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl GatewayConfig {
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            chain_id: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            tx_timeout: DEFAULT_TX_TIMEOUT,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }
}

/// A certificate as the registry reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnChainCertificate {
    pub id: String,
    pub recipient_hash: Digest,
    pub course_hash: Digest,
    pub issue_date: Timestamp,
    pub signature: RecoverableSignature,
    /// Only known when the contract's view returns a revocation flag.
    pub revoked: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not mined yet, or unknown to the node.
    Pending,
    Mined(Receipt),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPayload {
    Issued {
        id: CertificateId,
        recipient_hash: Digest,
        course_hash: Digest,
        issue_date: Timestamp,
        signature: RecoverableSignature,
    },
    Revoked {
        id: CertificateId,
    },
    AdminAdded {
        admin: Address,
    },
    AdminRemoved {
        admin: Address,
    },
}

/// A decoded registry log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainEvent {
    pub position: EventPosition,
    pub tx_hash: TxHash,
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Issued { .. } => EventKind::CertificateIssued,
            EventPayload::Revoked { .. } => EventKind::CertificateRevoked,
            EventPayload::AdminAdded { .. } => EventKind::AdminAdded,
            EventPayload::AdminRemoved { .. } => EventKind::AdminRemoved,
        }
    }

    /// The certificate id or admin address the event is about.
    pub fn subject(&self) -> String {
        match &self.payload {
            EventPayload::Issued { id, .. } | EventPayload::Revoked { id } => id.to_string(),
            EventPayload::AdminAdded { admin } | EventPayload::AdminRemoved { admin } => {
                admin.to_string()
            }
        }
    }
}

pub struct ChainGateway {
    transport: Arc<dyn ChainTransport>,
    abi: ContractAbi,
    key: AdminKey,
    config: GatewayConfig,
    chain_id: OnceCell<u64>,
    /// Next nonce to use, `None` when it must be refetched.
    next_nonce: Mutex<Option<u64>>,
}

impl ChainGateway {
    pub fn new(
        transport: Arc<dyn ChainTransport>,
        abi: ContractAbi,
        key: AdminKey,
        config: GatewayConfig,
    ) -> Self {
        let chain_id = match config.chain_id {
            Some(id) => OnceCell::new_with(Some(id)),
            None => OnceCell::new(),
        };
        Self {
            transport,
            abi,
            key,
            config,
            chain_id,
            next_nonce: Mutex::new(None),
        }
    }

    pub fn admin_address(&self) -> Address {
        self.key.address()
    }

    pub fn contract(&self) -> Address {
        self.config.contract
    }

    pub fn abi(&self) -> &ContractAbi {
        &self.abi
    }

    /// Keccak-256 of the UTF-8 bytes of `data`.
    pub fn hash(&self, data: &str) -> Digest {
        hash_text(data)
    }

    /// Sign a certificate commitment given its hashes as hex text.
    pub fn sign(
        &self,
        id: &CertificateId,
        recipient_hash: &str,
        course_hash: &str,
    ) -> Result<RecoverableSignature, ChainError> {
        let parse = |field: &str, value: &str| {
            Digest::from_hex(value)
                .map_err(|e| ChainError::InvalidInput(format!("{field}: {e}")))
        };
        let recipient_hash = parse("recipient hash", recipient_hash)?;
        let course_hash = parse("course hash", course_hash)?;
        Ok(sign_certificate(&self.key, id.as_str(), &recipient_hash, &course_hash)?)
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.chain_id
            .get_or_try_init(|| async { self.transport.chain_id().await })
            .await
            .copied()
    }

    /// Simulate, sign, broadcast and wait for the receipt of a contract call.
    pub async fn submit(&self, function: &str, args: &[Token]) -> Result<Receipt, ChainError> {
        let data = self.abi.function(function)?.encode_input(args)?;
        let from = self.key.address();

        let simulation = CallRequest {
            from: Some(from),
            to: self.config.contract,
            data: data.clone(),
        };
        match self.transport.call(&simulation).await {
            Ok(_) => {}
            Err(ChainError::Reverted { reason }) => {
                tracing::debug!(function, %reason, "simulation reverted");
                return Err(ChainError::TransactionFailed {
                    tx_hash: None,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }

        let chain_id = self.chain_id().await?;
        let gas_price = self.transport.gas_price().await?;

        let tx_hash = {
            let mut next_nonce = self.next_nonce.lock().await;
            let fetched = self.transport.pending_nonce(&from).await?;
            let nonce = next_nonce.map_or(fetched, |local| local.max(fetched));

            let signed = TransactionRequest {
                nonce,
                gas_price,
                gas_limit: self.config.gas_limit,
                to: self.config.contract,
                value: 0,
                data,
                chain_id,
            }
            .sign(&self.key)?;

            match self.transport.send_raw_transaction(&signed.raw).await {
                Ok(hash) => {
                    if hash != signed.hash {
                        tracing::warn!(local = %signed.hash, node = %hash, "node reported a different tx hash");
                    }
                    *next_nonce = Some(nonce + 1);
                    tracing::info!(function, nonce, tx_hash = %hash, "transaction broadcast");
                    hash
                }
                Err(e) => {
                    *next_nonce = None;
                    tracing::warn!(function, nonce, error = %e, "broadcast failed");
                    return Err(e);
                }
            }
        };

        self.wait_for_receipt(tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, ChainError> {
        let poll = async {
            loop {
                match self.transport.transaction_receipt(&tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(e) if e.is_retryable() => {
                        tracing::debug!(%tx_hash, error = %e, "receipt poll failed");
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(self.config.receipt_poll_interval).await;
            }
        };

        let receipt = tokio::time::timeout(self.config.tx_timeout, poll)
            .await
            .map_err(|_| ChainError::TransactionTimeout { tx_hash })??;

        if !receipt.success {
            return Err(ChainError::TransactionFailed {
                tx_hash: Some(tx_hash),
                reason: "transaction reverted".to_string(),
            });
        }
        Ok(receipt)
    }

    pub async fn issue_certificate(
        &self,
        id: &CertificateId,
        recipient_hash: &Digest,
        course_hash: &Digest,
        signature: &RecoverableSignature,
    ) -> Result<Receipt, ChainError> {
        self.submit(
            "issueCertificate",
            &[
                Token::String(id.to_string()),
                Token::FixedBytes(recipient_hash.as_bytes().to_vec()),
                Token::FixedBytes(course_hash.as_bytes().to_vec()),
                Token::Bytes(signature.as_bytes().to_vec()),
            ],
        )
        .await
    }

    pub async fn revoke_certificate(&self, id: &CertificateId) -> Result<Receipt, ChainError> {
        self.submit("revokeCertificate", &[Token::String(id.to_string())])
            .await
    }

    pub async fn add_admin(&self, admin: &Address) -> Result<Receipt, ChainError> {
        self.submit("addAdmin", &[Token::Address(*admin)]).await
    }

    pub async fn remove_admin(&self, admin: &Address) -> Result<Receipt, ChainError> {
        self.submit("removeAdmin", &[Token::Address(*admin)]).await
    }

    /// Look a certificate up on chain.
    pub async fn verify(&self, id: &CertificateId) -> Result<OnChainCertificate, ChainError> {
        let function = self.abi.function("verifyCertificate")?;
        let request = CallRequest {
            from: None,
            to: self.config.contract,
            data: function.encode_input(&[Token::String(id.to_string())])?,
        };
        let output = match self.transport.call(&request).await {
            Ok(output) => output,
            Err(ChainError::Reverted { reason }) => {
                return Err(ChainError::NotFound(format!("{id}: {reason}")))
            }
            Err(e) => return Err(e),
        };
        decode_certificate(function, &output)?
            .ok_or_else(|| ChainError::NotFound(id.to_string()))
    }

    pub async fn transaction_status(&self, tx_hash: &TxHash) -> Result<TransactionStatus, ChainError> {
        Ok(match self.transport.transaction_receipt(tx_hash).await? {
            Some(receipt) => TransactionStatus::Mined(receipt),
            None => TransactionStatus::Pending,
        })
    }

    /// Registry events of `kind` in `[from, to]`, in log order.
    ///
    /// Fails with [`ChainError::Decode`] if any log in the range does not
    /// decode, so the caller never moves past an event it could not read.
    pub async fn events(&self, kind: EventKind, from: u64, to: u64) -> Result<Vec<ChainEvent>, ChainError> {
        let event = self.abi.event(kind.as_str())?;
        let filter = LogFilter {
            address: self.config.contract,
            topic: event.topic(),
            from_block: from,
            to_block: to,
        };
        let mut logs = self.transport.logs(&filter).await?;
        logs.sort_by_key(Log::position);

        logs.iter()
            .map(|log| {
                self.decode_event(kind, log).map_err(|e| {
                    tracing::warn!(
                        kind = %kind,
                        position = %log.position(),
                        tx_hash = %log.tx_hash,
                        error = %e,
                        "undecodable registry log"
                    );
                    ChainError::Decode(format!("log at {}: {e}", log.position()))
                })
            })
            .collect()
    }

    fn decode_event(&self, kind: EventKind, log: &Log) -> Result<ChainEvent, ChainError> {
        let fields = self.abi.event(kind.as_str())?.decode_log(&log.topics, &log.data)?;
        let payload = event_payload(kind, fields)?;
        Ok(ChainEvent {
            position: log.position(),
            tx_hash: log.tx_hash,
            payload,
        })
    }

    pub async fn head(&self) -> Result<u64, ChainError> {
        self.transport.block_number().await
    }

    pub async fn block_timestamp(&self, number: u64) -> Result<Timestamp, ChainError> {
        self.transport.block_timestamp(number).await
    }
}

/// Pick a decoded event field by name, falling back to declaration order.
fn take_field(fields: &mut [(String, Token)], name: &str, index: usize) -> Result<Token, ChainError> {
    let slot = match fields.iter().position(|(n, _)| n == name) {
        Some(pos) => pos,
        None if index < fields.len() => index,
        None => return Err(ChainError::Decode(format!("event has no field {name}"))),
    };
    Ok(std::mem::replace(&mut fields[slot].1, Token::Bool(false)))
}

fn certificate_id(token: Token) -> Result<CertificateId, ChainError> {
    let raw = token
        .into_string()
        .ok_or_else(|| ChainError::Decode("certificate id is not a string".into()))?;
    Ok(CertificateId::from_ledger(raw))
}

fn signature(token: Token) -> Result<RecoverableSignature, ChainError> {
    let bytes = token
        .into_bytes()
        .ok_or_else(|| ChainError::Decode("signature is not bytes".into()))?;
    RecoverableSignature::from_slice(&bytes).map_err(|e| ChainError::Decode(e.to_string()))
}

fn digest(token: Token, field: &str) -> Result<Digest, ChainError> {
    token
        .to_digest()
        .ok_or_else(|| ChainError::Decode(format!("{field} is not bytes32")))
}

fn address(token: Token) -> Result<Address, ChainError> {
    token
        .to_address()
        .ok_or_else(|| ChainError::Decode("admin is not an address".into()))
}

fn event_payload(kind: EventKind, mut fields: Vec<(String, Token)>) -> Result<EventPayload, ChainError> {
    Ok(match kind {
        EventKind::CertificateIssued => EventPayload::Issued {
            id: certificate_id(take_field(&mut fields, "id", 0)?)?,
            recipient_hash: digest(take_field(&mut fields, "recipientHash", 1)?, "recipientHash")?,
            course_hash: digest(take_field(&mut fields, "courseHash", 2)?, "courseHash")?,
            issue_date: Timestamp::new(
                take_field(&mut fields, "issueDate", 3)?
                    .to_u64()
                    .ok_or_else(|| ChainError::Decode("issueDate is not a uint".into()))?,
            ),
            signature: signature(take_field(&mut fields, "signature", 4)?)?,
        },
        EventKind::CertificateRevoked => EventPayload::Revoked {
            id: certificate_id(take_field(&mut fields, "id", 0)?)?,
        },
        EventKind::AdminAdded => EventPayload::AdminAdded {
            admin: address(take_field(&mut fields, "admin", 0)?)?,
        },
        EventKind::AdminRemoved => EventPayload::AdminRemoved {
            admin: address(take_field(&mut fields, "admin", 0)?)?,
        },
    })
}

/// Decode a `verifyCertificate` result. `None` means the id is unknown
/// (the registry returns an empty record).
///
/// Accepts the five-field `(id, recipientHash, courseHash, issueDate,
/// signature)` shape, optionally wrapped in a tuple, and a six-field shape
/// with a trailing `revoked` flag even when the ABI declares only five.
pub fn decode_certificate(function: &Function, output: &[u8]) -> Result<Option<OnChainCertificate>, ChainError> {
    if output.is_empty() {
        return Ok(None);
    }
    let mut tokens = function.decode_output(output)?;
    if let [Token::Tuple(_)] = tokens.as_slice() {
        if let Some(Token::Tuple(inner)) = tokens.pop() {
            tokens = inner;
        }
    } else if tokens.len() == 5 {
        // The head of a flat encoding ends where the first dynamic value
        // (the id string) starts: six words means a trailing flag.
        if output.len() >= 6 * 32 && output[..24].iter().all(|b| *b == 0) {
            let mut offset = [0u8; 8];
            offset.copy_from_slice(&output[24..32]);
            if u64::from_be_bytes(offset) == 6 * 32 {
                let flag = crate::abi::decode(&[crate::abi::ParamType::Bool], &output[5 * 32..])?;
                tokens.extend(flag);
            }
        }
    }
    if tokens.len() != 5 && tokens.len() != 6 {
        return Err(ChainError::Decode(format!(
            "verifyCertificate returned {} values",
            tokens.len()
        )));
    }

    let mut tokens = tokens.into_iter();
    let mut next = || tokens.next().ok_or_else(|| ChainError::Decode("short result".into()));
    let id = next()?
        .into_string()
        .ok_or_else(|| ChainError::Decode("id is not a string".into()))?;
    if id.is_empty() {
        return Ok(None);
    }
    let recipient_hash = digest(next()?, "recipientHash")?;
    let course_hash = digest(next()?, "courseHash")?;
    let issue_date = next()?
        .to_u64()
        .ok_or_else(|| ChainError::Decode("issueDate is not a uint".into()))?;
    let signature = signature(next()?)?;
    let revoked = next().ok().and_then(|t| t.to_bool());

    Ok(Some(OnChainCertificate {
        id,
        recipient_hash,
        course_hash,
        issue_date: Timestamp::new(issue_date),
        signature,
        revoked,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::encode;

    fn verify_fn() -> Function {
        ContractAbi::bundled()
            .unwrap()
            .function("verifyCertificate")
            .unwrap()
            .clone()
    }

    fn five_fields(id: &str) -> Vec<Token> {
        vec![
            Token::String(id.into()),
            Token::FixedBytes(vec![1; 32]),
            Token::FixedBytes(vec![2; 32]),
            Token::Uint(1_700_000_000),
            Token::Bytes(vec![3; 65]),
        ]
    }

    #[test]
    fn five_field_result() {
        let cert = decode_certificate(&verify_fn(), &encode(&five_fields("CERT-1")))
            .unwrap()
            .unwrap();
        assert_eq!(cert.id, "CERT-1");
        assert_eq!(cert.recipient_hash, Digest::new([1; 32]));
        assert_eq!(cert.issue_date, Timestamp::new(1_700_000_000));
        assert_eq!(cert.revoked, None);
    }

    #[test]
    fn six_field_result_carries_revocation() {
        let mut tokens = five_fields("CERT-2");
        tokens.push(Token::Bool(true));
        let cert = decode_certificate(&verify_fn(), &encode(&tokens))
            .unwrap()
            .unwrap();
        assert_eq!(cert.revoked, Some(true));
        assert_eq!(cert.signature, RecoverableSignature::new([3; 65]));
    }

    #[test]
    fn empty_record_means_not_found() {
        assert_eq!(decode_certificate(&verify_fn(), &encode(&five_fields(""))).unwrap(), None);
        assert_eq!(decode_certificate(&verify_fn(), &[]).unwrap(), None);
    }

    #[test]
    fn short_signature_is_a_decode_error() {
        let mut tokens = five_fields("CERT-3");
        tokens[4] = Token::Bytes(vec![3; 64]);
        assert!(decode_certificate(&verify_fn(), &encode(&tokens)).is_err());
    }

    #[test]
    fn issued_payload_by_name() {
        let fields = vec![
            ("id".to_string(), Token::String("CERT-4".into())),
            ("recipientHash".to_string(), Token::FixedBytes(vec![4; 32])),
            ("courseHash".to_string(), Token::FixedBytes(vec![5; 32])),
            ("issueDate".to_string(), Token::Uint(42)),
            ("signature".to_string(), Token::Bytes(vec![6; 65])),
        ];
        let payload = event_payload(EventKind::CertificateIssued, fields).unwrap();
        match payload {
            EventPayload::Issued { id, issue_date, .. } => {
                assert_eq!(id.as_str(), "CERT-4");
                assert_eq!(issue_date, Timestamp::new(42));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn admin_payload_falls_back_to_position() {
        let fields = vec![("".to_string(), Token::Address(Address::new([7; 20])))];
        assert_eq!(
            event_payload(EventKind::AdminRemoved, fields).unwrap(),
            EventPayload::AdminRemoved {
                admin: Address::new([7; 20])
            }
        );
    }
}
