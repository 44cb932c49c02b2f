//! Game Codes
//!
//! Short human-shareable identifiers for tournaments. One tournament
//! document exists per code.

use std::fmt;

use rand::Rng;
use serde::{Serialize, Deserialize};

/// Default number of characters in a generated code.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Shortest code accepted from user input.
pub const MIN_CODE_LENGTH: usize = 4;

/// Longest code accepted from user input.
pub const MAX_CODE_LENGTH: usize = 16;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A validated, uppercase game code.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameCode(String);

/// Code failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed game code: {0:?}")]
pub struct MalformedCode(pub String);

impl GameCode {
    /// Parse user input. Case-insensitive; surrounding whitespace ignored.
    pub fn parse(input: &str) -> Result<Self, MalformedCode> {
        let code = input.trim().to_ascii_uppercase();
        let valid_len = (MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code.len());
        if !valid_len || !code.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(MalformedCode(input.to_string()));
        }
        Ok(Self(code))
    }

    /// Generate a random code of the given length.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, length: usize) -> Self {
        let length = length.clamp(MIN_CODE_LENGTH, MAX_CODE_LENGTH);
        let code = (0..length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GameCode {
    type Error = MalformedCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GameCode> for String {
    fn from(code: GameCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_normalizes_case() {
        let code = GameCode::parse(" ab12cd ").unwrap();
        assert_eq!(code.as_str(), "AB12CD");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(GameCode::parse("").is_err());
        assert!(GameCode::parse("abc").is_err());
        assert!(GameCode::parse("AB-12C").is_err());
        assert!(GameCode::parse("ÄBCDEF").is_err());
        assert!(GameCode::parse(&"A".repeat(MAX_CODE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_generate_is_parseable() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = GameCode::generate(&mut rng, DEFAULT_CODE_LENGTH);
            assert_eq!(code.as_str().len(), DEFAULT_CODE_LENGTH);
            assert_eq!(GameCode::parse(code.as_str()), Ok(code));
        }
    }

    #[test]
    fn test_serde_validates() {
        let code: GameCode = serde_json::from_str("\"qwer12\"").unwrap();
        assert_eq!(code.as_str(), "QWER12");
        assert!(serde_json::from_str::<GameCode>("\"no\"").is_err());
    }
}
