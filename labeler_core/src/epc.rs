//! EPC label identifiers: a 15-hex-digit prefix followed by an 8-hex-digit counter.

use thiserror::Error;

pub const PREFIX_LEN: usize = 15;
pub const SUFFIX_LEN: usize = 8;
pub const TOTAL_LEN: usize = PREFIX_LEN + SUFFIX_LEN;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EpcError {
    #[error("epc prefix must be {PREFIX_LEN} hex chars, got {0:?}")]
    BadPrefix(String),
    #[error("epc counter {0} does not fit the 32-bit suffix")]
    CounterOverflow(u64),
    #[error("invalid epc code {0:?}")]
    Malformed(String),
}

/// Validated, upper-case EPC code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpcCode(String);

impl EpcCode {
    /// Build a code from a prefix and counter. The suffix length is fixed, so
    /// counters above `u32::MAX` are rejected rather than widening the code.
    pub fn create(prefix: &str, counter: u64) -> Result<Self, EpcError> {
        if !is_valid_prefix(prefix) {
            return Err(EpcError::BadPrefix(prefix.to_string()));
        }
        if counter > u64::from(u32::MAX) {
            return Err(EpcError::CounterOverflow(counter));
        }
        Self::parse(&format!("{prefix}{counter:08X}"))
    }

    pub fn parse(value: &str) -> Result<Self, EpcError> {
        if value.len() != TOTAL_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(EpcError::Malformed(value.to_string()));
        }
        Ok(Self(value.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for EpcCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EpcCode {
    type Err = EpcError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// True for exactly `PREFIX_LEN` hex digits.
pub fn is_valid_prefix(prefix: &str) -> bool {
    prefix.len() == PREFIX_LEN && prefix.bytes().all(|b| b.is_ascii_hexdigit())
}
