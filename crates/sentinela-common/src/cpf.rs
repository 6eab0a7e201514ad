//! CPF (Brazilian taxpayer registry number) value object.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A validated 11-digit CPF with checksum.
///
/// `Display` intentionally renders the masked form (`NNN.NNN.***-**`) —
/// the canonical digits never leave this type except through
/// [`Cpf::canonical`] and [`Cpf::formatted`], both of which callers must
/// use deliberately (never in a `tracing` field or log line).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cpf {
    digits: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CpfError {
    #[error("invalid_cpf_format")]
    InvalidFormat,
}

impl Cpf {
    /// Parses a CPF from raw input, stripping any formatting characters.
    pub fn from_raw(raw: &str) -> Result<Self, CpfError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if !Self::is_valid(&digits) {
            return Err(CpfError::InvalidFormat);
        }
        Ok(Self { digits })
    }

    fn is_valid(digits: &str) -> bool {
        if digits.len() != 11 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let first = digits.as_bytes()[0];
        if digits.bytes().all(|b| b == first) {
            return false;
        }

        let d: Vec<u32> = digits.bytes().map(|b| (b - b'0') as u32).collect();

        let sum1: u32 = (0..9).map(|i| d[i] * (10 - i as u32)).sum();
        let mut digit1 = 11 - (sum1 % 11);
        if digit1 >= 10 {
            digit1 = 0;
        }

        let sum2: u32 = (0..10).map(|i| d[i] * (11 - i as u32)).sum();
        let mut digit2 = 11 - (sum2 % 11);
        if digit2 >= 10 {
            digit2 = 0;
        }

        d[9] == digit1 && d[10] == digit2
    }

    /// The canonical 11-digit form, for equality comparisons and storage.
    pub fn canonical(&self) -> &str {
        &self.digits
    }

    /// `NNN.NNN.NNN-NN` — only for surfaces the user is entitled to see
    /// their own CPF on. Never pass this to `tracing`.
    pub fn formatted(&self) -> String {
        format!(
            "{}.{}.{}-{}",
            &self.digits[0..3],
            &self.digits[3..6],
            &self.digits[6..9],
            &self.digits[9..11]
        )
    }

    /// `NNN.NNN.***-**` — safe for logs and user-facing error messages.
    pub fn masked(&self) -> String {
        format!("{}.{}.***-**", &self.digits[0..3], &self.digits[3..6])
    }

    /// Salted SHA-256 hash, for duplicate-detection indexing without
    /// storing the CPF itself.
    pub fn hash(&self, salt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(self.digits.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "529.982.247-25";

    #[test]
    fn accepts_valid_checksum_with_formatting_stripped() {
        let cpf = Cpf::from_raw(VALID).unwrap();
        assert_eq!(cpf.canonical(), "52998224725");
    }

    #[test]
    fn rejects_all_repeated_digits() {
        assert_eq!(Cpf::from_raw("111.111.111-11"), Err(CpfError::InvalidFormat));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(Cpf::from_raw("123456"), Err(CpfError::InvalidFormat));
    }

    #[test]
    fn rejects_bad_checksum() {
        assert_eq!(Cpf::from_raw("529.982.247-00"), Err(CpfError::InvalidFormat));
    }

    #[test]
    fn formatted_and_masked_forms() {
        let cpf = Cpf::from_raw(VALID).unwrap();
        assert_eq!(cpf.formatted(), "529.982.247-25");
        assert_eq!(cpf.masked(), "529.982.***-**");
        assert_eq!(cpf.to_string(), "529.982.***-**");
    }

    #[test]
    fn hash_is_deterministic_and_salt_sensitive() {
        let cpf = Cpf::from_raw(VALID).unwrap();
        assert_eq!(cpf.hash("s1"), cpf.hash("s1"));
        assert_ne!(cpf.hash("s1"), cpf.hash("s2"));
    }
}
