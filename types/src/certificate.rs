//! Certificate identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A certificate identifier.
///
/// Identifiers are immutable once issued. [`CertificateId::new`] applies the
/// policy for ids this node issues. Ids that already exist on the ledger go
/// through [`CertificateId::lookup`] or [`CertificateId::from_ledger`], which
/// accept whatever the contract accepted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CertificateId(String);

impl CertificateId {
    /// Upper bound on the UTF-8 length of an id issued by this node.
    pub const MAX_LEN: usize = 256;

    /// Validate an id for a new issue.
    pub fn new(raw: impl Into<String>) -> Result<Self, TypesError> {
        let s = Self::lookup(raw)?.0;
        if s.len() > Self::MAX_LEN {
            return Err(TypesError::InvalidCertificateId(format!(
                "{} bytes exceeds {}",
                s.len(),
                Self::MAX_LEN
            )));
        }
        if s.chars().any(char::is_control) {
            return Err(TypesError::InvalidCertificateId(
                "contains control characters".into(),
            ));
        }
        Ok(Self(s))
    }

    /// Validate an id that names an existing certificate. Only blank ids are
    /// rejected.
    pub fn lookup(raw: impl Into<String>) -> Result<Self, TypesError> {
        let s = raw.into();
        if s.trim().is_empty() {
            return Err(TypesError::InvalidCertificateId("empty".into()));
        }
        Ok(Self(s))
    }

    /// An id exactly as the registry recorded it.
    pub fn from_ledger(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CertificateId {
    fn from(value: String) -> Self {
        Self::from_ledger(value)
    }
}

impl From<CertificateId> for String {
    fn from(id: CertificateId) -> Self {
        id.0
    }
}

impl std::str::FromStr for CertificateId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_and_oversized() {
        assert!(CertificateId::new("   ").is_err());
        assert!(CertificateId::new("x".repeat(257)).is_err());
        assert!(CertificateId::new("a\nb").is_err());
        assert!(CertificateId::new("C1").is_ok());
    }

    #[test]
    fn lookup_accepts_what_the_ledger_accepts() {
        let long = "x".repeat(300);
        assert_eq!(CertificateId::lookup(long.clone()).unwrap().as_str(), long);
        assert!(CertificateId::lookup("a\nb").is_ok());
        assert!(CertificateId::lookup(" ").is_err());
        assert_eq!(CertificateId::from_ledger("a\tb").as_str(), "a\tb");
    }

    #[test]
    fn stored_ids_deserialize_unchanged() {
        let ok: CertificateId = serde_json::from_str("\"CERT-2024-001\"").unwrap();
        assert_eq!(ok.as_str(), "CERT-2024-001");
        let long = "y".repeat(400);
        let json = serde_json::to_string(&CertificateId::from_ledger(long.clone())).unwrap();
        let back: CertificateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), long);
    }
}
