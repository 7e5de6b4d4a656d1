//! Contract ABI: parameter types, head/tail encoding, and the JSON ABI format.
//!
//! Only the subset of the ABI type system the certificate registry uses is
//! supported: `address`, `bool`, `uintN` (values up to 128 bits), `bytesN`,
//! `bytes`, `string` and tuples of those. Entries in a JSON ABI that use
//! anything else (arrays, signed integers) are skipped when loading.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use certchain_crypto::keccak256;
use certchain_types::{Address, Digest};
use serde::Deserialize;

use crate::ChainError;

const WORD: usize = 32;

/// The registry ABI compiled into the binary.
pub const BUNDLED_ABI: &str = include_str!("../abi/certificate_registry.json");

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Bool,
    /// Unsigned integer of the given bit width.
    Uint(usize),
    /// `bytes1` ..= `bytes32`.
    FixedBytes(usize),
    Bytes,
    String,
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Parse a non-tuple type name such as `uint256` or `bytes32`.
    pub fn parse(name: &str) -> Result<Self, ChainError> {
        let ty = match name {
            "address" => ParamType::Address,
            "bool" => ParamType::Bool,
            "bytes" => ParamType::Bytes,
            "string" => ParamType::String,
            "uint" => ParamType::Uint(256),
            _ => {
                if let Some(bits) = name.strip_prefix("uint") {
                    let bits: usize = bits
                        .parse()
                        .map_err(|_| ChainError::Abi(format!("unsupported type {name}")))?;
                    if bits == 0 || bits > 256 || bits % 8 != 0 {
                        return Err(ChainError::Abi(format!("invalid integer width {name}")));
                    }
                    ParamType::Uint(bits)
                } else if let Some(len) = name.strip_prefix("bytes") {
                    let len: usize = len
                        .parse()
                        .map_err(|_| ChainError::Abi(format!("unsupported type {name}")))?;
                    if len == 0 || len > WORD {
                        return Err(ChainError::Abi(format!("invalid fixed bytes width {name}")));
                    }
                    ParamType::FixedBytes(len)
                } else {
                    return Err(ChainError::Abi(format!("unsupported type {name}")));
                }
            }
        };
        Ok(ty)
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Bytes | ParamType::String => true,
            ParamType::Tuple(members) => members.iter().any(ParamType::is_dynamic),
            _ => false,
        }
    }

    /// Bytes this type occupies in the head of an enclosing encoding.
    fn head_size(&self) -> usize {
        match self {
            ParamType::Tuple(members) if !self.is_dynamic() => {
                members.iter().map(ParamType::head_size).sum()
            }
            _ => WORD,
        }
    }

    /// The canonical name used in signatures.
    pub fn canonical(&self) -> String {
        match self {
            ParamType::Address => "address".to_string(),
            ParamType::Bool => "bool".to_string(),
            ParamType::Uint(bits) => format!("uint{bits}"),
            ParamType::FixedBytes(len) => format!("bytes{len}"),
            ParamType::Bytes => "bytes".to_string(),
            ParamType::String => "string".to_string(),
            ParamType::Tuple(members) => {
                let inner: Vec<String> = members.iter().map(ParamType::canonical).collect();
                format!("({})", inner.join(","))
            }
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A decoded or to-be-encoded ABI value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Bool(bool),
    Uint(u128),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
    Tuple(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::Bytes(_) | Token::String(_) => true,
            Token::Tuple(members) => members.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Token::Tuple(members) if !self.is_dynamic() => {
                members.iter().map(Token::head_size).sum()
            }
            _ => WORD,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Token::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// A `bytes32` value as a digest.
    pub fn to_digest(&self) -> Option<Digest> {
        match self {
            Token::FixedBytes(b) if b.len() == WORD => Digest::from_slice(b).ok(),
            _ => None,
        }
    }

    pub fn to_address(&self) -> Option<Address> {
        match self {
            Token::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Token::Uint(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let rem = out.len() % WORD;
    if rem != 0 {
        out.resize(out.len() + WORD - rem, 0);
    }
    out
}

/// Encode a value into its 32-byte topic or head word (static values only).
fn encode_word(token: &Token) -> Option<[u8; WORD]> {
    match token {
        Token::Address(a) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(a.as_bytes());
            Some(word)
        }
        Token::Bool(b) => Some(uint_word(u128::from(*b))),
        Token::Uint(v) => Some(uint_word(*v)),
        Token::FixedBytes(b) if b.len() <= WORD => {
            let mut word = [0u8; WORD];
            word[..b.len()].copy_from_slice(b);
            Some(word)
        }
        _ => None,
    }
}

fn encode_single(token: &Token) -> Vec<u8> {
    match token {
        Token::Bytes(b) => {
            let mut out = uint_word(b.len() as u128).to_vec();
            out.extend(padded(b));
            out
        }
        Token::String(s) => {
            let mut out = uint_word(s.len() as u128).to_vec();
            out.extend(padded(s.as_bytes()));
            out
        }
        Token::Tuple(members) => encode(members),
        other => encode_word(other).map(|w| w.to_vec()).unwrap_or_default(),
    }
}

/// Standard head/tail encoding of a parameter list.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend(encode_single(token));
        } else {
            head.extend(encode_single(token));
        }
    }
    head.extend(tail);
    head
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8], ChainError> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| ChainError::Decode("offset overflow".into()))?;
    data.get(offset..end)
        .ok_or_else(|| ChainError::Decode(format!("word at {offset} out of bounds ({} bytes)", data.len())))
}

fn word_to_usize(word: &[u8]) -> Result<usize, ChainError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("length or offset too large".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(buf))
        .map_err(|_| ChainError::Decode("length or offset too large".into()))
}

fn decode_word(ty: &ParamType, word: &[u8]) -> Result<Token, ChainError> {
    match ty {
        ParamType::Address => {
            if word[..12].iter().any(|b| *b != 0) {
                return Err(ChainError::Decode("address word has dirty high bytes".into()));
            }
            Address::from_slice(&word[12..])
                .map(Token::Address)
                .map_err(|e| ChainError::Decode(e.to_string()))
        }
        ParamType::Bool => match word_to_usize(word)? {
            0 => Ok(Token::Bool(false)),
            1 => Ok(Token::Bool(true)),
            other => Err(ChainError::Decode(format!("invalid bool value {other}"))),
        },
        ParamType::Uint(_) => {
            if word[..16].iter().any(|b| *b != 0) {
                return Err(ChainError::Decode("integer exceeds 128 bits".into()));
            }
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&word[16..]);
            Ok(Token::Uint(u128::from_be_bytes(buf)))
        }
        ParamType::FixedBytes(len) => Ok(Token::FixedBytes(word[..*len].to_vec())),
        other => Err(ChainError::Decode(format!("{other} is not a single-word type"))),
    }
}

fn decode_param(ty: &ParamType, data: &[u8], offset: usize) -> Result<Token, ChainError> {
    match ty {
        ParamType::Bytes | ParamType::String => {
            let tail = word_to_usize(read_word(data, offset)?)?;
            let len = word_to_usize(read_word(data, tail)?)?;
            let start = tail + WORD;
            let bytes = start
                .checked_add(len)
                .and_then(|end| data.get(start..end))
                .ok_or_else(|| ChainError::Decode(format!("{ty} of {len} bytes out of bounds")))?
                .to_vec();
            if *ty == ParamType::String {
                String::from_utf8(bytes)
                    .map(Token::String)
                    .map_err(|e| ChainError::Decode(e.to_string()))
            } else {
                Ok(Token::Bytes(bytes))
            }
        }
        ParamType::Tuple(members) => {
            let base = if ty.is_dynamic() {
                word_to_usize(read_word(data, offset)?)?
            } else {
                offset
            };
            let inner = data
                .get(base..)
                .ok_or_else(|| ChainError::Decode("tuple offset out of bounds".into()))?;
            decode(members, inner).map(Token::Tuple)
        }
        _ => decode_word(ty, read_word(data, offset)?),
    }
}

/// Decode a parameter list encoded with [`encode`].
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, ChainError> {
    let mut tokens = Vec::with_capacity(types.len());
    let mut offset = 0;
    for ty in types {
        tokens.push(decode_param(ty, data, offset)?);
        offset += ty.head_size();
    }
    Ok(tokens)
}

/// A named function or event parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamType,
    pub indexed: bool,
}

fn signature_of(name: &str, params: &[Param]) -> String {
    let types: Vec<String> = params.iter().map(|p| p.kind.canonical()).collect();
    format!("{name}({})", types.join(","))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
}

impl Function {
    pub fn signature(&self) -> String {
        signature_of(&self.name, &self.inputs)
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Selector followed by the encoded arguments.
    pub fn encode_input(&self, args: &[Token]) -> Result<Vec<u8>, ChainError> {
        if args.len() != self.inputs.len() {
            return Err(ChainError::Abi(format!(
                "{} takes {} arguments, got {}",
                self.name,
                self.inputs.len(),
                args.len()
            )));
        }
        let mut out = self.selector().to_vec();
        out.extend(encode(args));
        Ok(out)
    }

    /// Decode call arguments (selector included) back into tokens.
    pub fn decode_input(&self, calldata: &[u8]) -> Result<Vec<Token>, ChainError> {
        match calldata.get(..4) {
            Some(selector) if selector == self.selector() => {
                decode(&self.input_types(), &calldata[4..])
            }
            _ => Err(ChainError::Decode(format!(
                "calldata does not start with the {} selector",
                self.name
            ))),
        }
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<Token>, ChainError> {
        let types: Vec<ParamType> = self.outputs.iter().map(|p| p.kind.clone()).collect();
        decode(&types, data)
    }

    fn input_types(&self) -> Vec<ParamType> {
        self.inputs.iter().map(|p| p.kind.clone()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub inputs: Vec<Param>,
    pub anonymous: bool,
}

impl Event {
    pub fn signature(&self) -> String {
        signature_of(&self.name, &self.inputs)
    }

    /// `topic0` of every log this event emits.
    pub fn topic(&self) -> Digest {
        Digest::new(keccak256(self.signature().as_bytes()))
    }

    /// Decode a log into `(name, value)` pairs in declaration order.
    ///
    /// Indexed dynamic values are only present as their hash in the topic,
    /// so they decode to `Token::FixedBytes` of that hash.
    pub fn decode_log(&self, topics: &[Digest], data: &[u8]) -> Result<Vec<(String, Token)>, ChainError> {
        let mut indexed = topics.iter();
        if !self.anonymous {
            match indexed.next() {
                Some(topic0) if *topic0 == self.topic() => {}
                _ => {
                    return Err(ChainError::Decode(format!(
                        "log is not a {} event",
                        self.name
                    )))
                }
            }
        }

        let data_types: Vec<ParamType> = self
            .inputs
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.kind.clone())
            .collect();
        let mut data_tokens = decode(&data_types, data)?.into_iter();

        let mut out = Vec::with_capacity(self.inputs.len());
        for param in &self.inputs {
            let token = if param.indexed {
                let topic = indexed.next().ok_or_else(|| {
                    ChainError::Decode(format!("missing topic for {}.{}", self.name, param.name))
                })?;
                if param.kind.is_dynamic() || matches!(param.kind, ParamType::Tuple(_)) {
                    Token::FixedBytes(topic.as_bytes().to_vec())
                } else {
                    decode_word(&param.kind, topic.as_bytes())?
                }
            } else {
                data_tokens
                    .next()
                    .ok_or_else(|| ChainError::Decode("missing data value".into()))?
            };
            out.push((param.name.clone(), token));
        }
        Ok(out)
    }

    /// Build the topics and data a contract emitting this event would log.
    pub fn encode_log(&self, args: &[Token]) -> Result<(Vec<Digest>, Vec<u8>), ChainError> {
        if args.len() != self.inputs.len() {
            return Err(ChainError::Abi(format!(
                "{} has {} fields, got {}",
                self.name,
                self.inputs.len(),
                args.len()
            )));
        }
        let mut topics = Vec::new();
        if !self.anonymous {
            topics.push(self.topic());
        }
        let mut data_tokens = Vec::new();
        for (param, token) in self.inputs.iter().zip(args) {
            if !param.indexed {
                data_tokens.push(token.clone());
                continue;
            }
            let word = match token {
                Token::String(s) => keccak256(s.as_bytes()),
                Token::Bytes(b) => keccak256(b),
                Token::Tuple(members) => keccak256(&encode(members)),
                other => encode_word(other)
                    .ok_or_else(|| ChainError::Abi(format!("cannot index {}", param.name)))?,
            };
            topics.push(Digest::new(word));
        }
        Ok((topics, encode(&data_tokens)))
    }
}

#[derive(Deserialize)]
struct ParamJson {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    indexed: bool,
    #[serde(default)]
    components: Vec<ParamJson>,
}

#[derive(Deserialize)]
struct EntryJson {
    #[serde(rename = "type", default = "default_entry_type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<ParamJson>,
    #[serde(default)]
    outputs: Vec<ParamJson>,
    #[serde(default)]
    anonymous: bool,
}

fn default_entry_type() -> String {
    "function".to_string()
}

fn param_type(json: &ParamJson) -> Result<ParamType, ChainError> {
    if json.ty == "tuple" {
        let members = json
            .components
            .iter()
            .map(param_type)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParamType::Tuple(members))
    } else {
        ParamType::parse(&json.ty)
    }
}

fn params(list: &[ParamJson]) -> Result<Vec<Param>, ChainError> {
    list.iter()
        .map(|p| {
            Ok(Param {
                name: p.name.clone(),
                kind: param_type(p)?,
                indexed: p.indexed,
            })
        })
        .collect()
}

/// The functions and events of one contract, indexed by name.
#[derive(Clone, Debug, Default)]
pub struct ContractAbi {
    functions: HashMap<String, Function>,
    events: HashMap<String, Event>,
}

impl ContractAbi {
    /// Parse a JSON ABI (an array of entries, or an object with an `abi` field).
    pub fn from_json(json: &str) -> Result<Self, ChainError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ChainError::Abi(format!("invalid ABI JSON: {e}")))?;
        let entries = match value {
            serde_json::Value::Object(mut obj) => obj
                .remove("abi")
                .ok_or_else(|| ChainError::Abi("ABI object has no `abi` field".into()))?,
            other => other,
        };
        let entries: Vec<EntryJson> = serde_json::from_value(entries)
            .map_err(|e| ChainError::Abi(format!("invalid ABI entry: {e}")))?;

        let mut abi = ContractAbi::default();
        for entry in entries {
            match entry.kind.as_str() {
                "function" => match (params(&entry.inputs), params(&entry.outputs)) {
                    (Ok(inputs), Ok(outputs)) => {
                        abi.functions.entry(entry.name.clone()).or_insert(Function {
                            name: entry.name,
                            inputs,
                            outputs,
                        });
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::debug!(function = %entry.name, error = %e, "skipping ABI function");
                    }
                },
                "event" => match params(&entry.inputs) {
                    Ok(inputs) => {
                        abi.events.entry(entry.name.clone()).or_insert(Event {
                            name: entry.name,
                            inputs,
                            anonymous: entry.anonymous,
                        });
                    }
                    Err(e) => {
                        tracing::debug!(event = %entry.name, error = %e, "skipping ABI event");
                    }
                },
                _ => {}
            }
        }
        Ok(abi)
    }

    pub fn bundled() -> Result<Self, ChainError> {
        Self::from_json(BUNDLED_ABI)
    }

    /// Load the ABI at `path`, or the bundled one when no path is configured.
    pub fn load(path: Option<&Path>) -> Result<Self, ChainError> {
        match path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    ChainError::Abi(format!("cannot read ABI {}: {e}", path.display()))
                })?;
                Self::from_json(&json)
            }
            None => Self::bundled(),
        }
    }

    pub fn function(&self, name: &str) -> Result<&Function, ChainError> {
        self.functions
            .get(name)
            .ok_or_else(|| ChainError::Abi(format!("ABI has no function {name}")))
    }

    pub fn event(&self, name: &str) -> Result<&Event, ChainError> {
        self.events
            .get(name)
            .ok_or_else(|| ChainError::Abi(format!("ABI has no event {name}")))
    }

    /// The function whose selector starts `calldata`.
    pub fn function_for_calldata(&self, calldata: &[u8]) -> Option<&Function> {
        let selector = calldata.get(..4)?;
        self.functions.values().find(|f| f.selector()[..] == *selector)
    }
}
