//! EIP-155 legacy transactions.

use certchain_crypto::{keccak256, sign_prehash, AdminKey};
use certchain_types::{Address, TxHash};

use crate::rlp::RlpItem;
use crate::ChainError;

/// An unsigned legacy transaction bound to a chain id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub request: TransactionRequest,
    pub raw: Vec<u8>,
    pub hash: TxHash,
    pub from: Address,
}

impl TransactionRequest {
    fn base_fields(&self) -> Vec<RlpItem> {
        vec![
            RlpItem::uint(u128::from(self.nonce)),
            RlpItem::uint(self.gas_price),
            RlpItem::uint(u128::from(self.gas_limit)),
            RlpItem::bytes(self.to.as_bytes().to_vec()),
            RlpItem::uint(self.value),
            RlpItem::bytes(self.data.clone()),
        ]
    }

    /// The hash that gets signed: `keccak(rlp([..fields, chain_id, 0, 0]))`.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.base_fields();
        fields.push(RlpItem::uint(u128::from(self.chain_id)));
        fields.push(RlpItem::uint(0));
        fields.push(RlpItem::uint(0));
        keccak256(&RlpItem::List(fields).encode())
    }

    pub fn sign(self, key: &AdminKey) -> Result<SignedTransaction, ChainError> {
        let (signature, recovery_id) = sign_prehash(key, &self.signing_hash())?;
        let rs = signature.to_bytes();
        let v = u128::from(recovery_id.to_byte()) + u128::from(self.chain_id) * 2 + 35;

        let mut fields = self.base_fields();
        fields.push(RlpItem::uint(v));
        fields.push(RlpItem::uint_bytes(&rs[..32]));
        fields.push(RlpItem::uint_bytes(&rs[32..]));
        let raw = RlpItem::List(fields).encode();
        let hash = TxHash::new(keccak256(&raw));

        Ok(SignedTransaction {
            request: self,
            raw,
            hash,
            from: key.address(),
        })
    }
}

/// Pull `(nonce, to, data, chain_id, sender)` back out of a raw legacy
/// transaction. Used by the in-memory ledger to execute what it receives.
pub fn decode_signed(raw: &[u8]) -> Result<DecodedTransaction, ChainError> {
    let items = match RlpDecoder::new(raw).item()? {
        RlpItem::List(items) if items.len() == 9 => items,
        _ => return Err(ChainError::Decode("not a legacy transaction".into())),
    };
    let v = rlp_uint(&items, 6)?;
    if v < 35 {
        return Err(ChainError::Decode("transaction is not replay protected".into()));
    }
    let chain_id = u64::try_from((v - 35) / 2)
        .map_err(|_| ChainError::Decode("chain id out of range".into()))?;
    let recovery = ((v - 35) % 2) as u8;

    let request = TransactionRequest {
        nonce: u64::try_from(rlp_uint(&items, 0)?).map_err(|_| ChainError::Decode("nonce too large".into()))?,
        gas_price: rlp_uint(&items, 1)?,
        gas_limit: u64::try_from(rlp_uint(&items, 2)?)
            .map_err(|_| ChainError::Decode("gas limit too large".into()))?,
        to: Address::from_slice(rlp_bytes(&items, 3)?).map_err(|e| ChainError::Decode(e.to_string()))?,
        value: rlp_uint(&items, 4)?,
        data: rlp_bytes(&items, 5)?.to_vec(),
        chain_id,
    };

    let mut sig = [0u8; 65];
    let (r, s) = (rlp_bytes(&items, 7)?, rlp_bytes(&items, 8)?);
    if r.len() > 32 || s.len() > 32 {
        return Err(ChainError::Decode("signature component too wide".into()));
    }
    sig[32 - r.len()..32].copy_from_slice(r);
    sig[64 - s.len()..64].copy_from_slice(s);
    sig[64] = recovery;
    let from = certchain_crypto::recover_signer(
        &request.signing_hash(),
        &certchain_types::RecoverableSignature::new(sig),
    )?;

    Ok(DecodedTransaction {
        hash: TxHash::new(keccak256(raw)),
        request,
        from,
    })
}

fn rlp_bytes(items: &[RlpItem], i: usize) -> Result<&[u8], ChainError> {
    match &items[i] {
        RlpItem::Bytes(b) => Ok(b.as_slice()),
        RlpItem::List(_) => Err(ChainError::Decode(format!("field {i} is a list"))),
    }
}

fn rlp_uint(items: &[RlpItem], i: usize) -> Result<u128, ChainError> {
    let bytes = rlp_bytes(items, i)?;
    if bytes.len() > 16 {
        return Err(ChainError::Decode(format!("field {i} too wide")));
    }
    Ok(bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub hash: TxHash,
    pub request: TransactionRequest,
    pub from: Address,
}

struct RlpDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RlpDecoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ChainError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| ChainError::Decode("rlp item out of bounds".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn length(&mut self, len_of_len: usize) -> Result<usize, ChainError> {
        if len_of_len > 8 {
            return Err(ChainError::Decode("rlp length too wide".into()));
        }
        let bytes = self.take(len_of_len)?;
        let len = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        usize::try_from(len).map_err(|_| ChainError::Decode("rlp length too large".into()))
    }

    fn item(&mut self) -> Result<RlpItem, ChainError> {
        let prefix = self.take(1)?[0];
        match prefix {
            0x00..=0x7f => Ok(RlpItem::Bytes(vec![prefix])),
            0x80..=0xb7 => Ok(RlpItem::Bytes(self.take(usize::from(prefix - 0x80))?.to_vec())),
            0xb8..=0xbf => {
                let len = self.length(usize::from(prefix - 0xb7))?;
                Ok(RlpItem::Bytes(self.take(len)?.to_vec()))
            }
            0xc0..=0xf7 => self.list(usize::from(prefix - 0xc0)),
            _ => {
                let len = self.length(usize::from(prefix - 0xf7))?;
                self.list(len)
            }
        }
    }

    fn list(&mut self, len: usize) -> Result<RlpItem, ChainError> {
        let mut inner = RlpDecoder::new(self.take(len)?);
        let mut items = Vec::new();
        while inner.pos < inner.data.len() {
            items.push(inner.item()?);
        }
        Ok(RlpItem::List(items))
    }
}
