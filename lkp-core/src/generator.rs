//! Random token generation.
//!
//! This module provides:
//! - [`EntropySource`] - Trait for secure random byte providers
//! - [`OsEntropy`] - The operating system CSPRNG
//! - [`GeneratorMode`] - Which digit-extraction algorithm to use
//! - [`TokenGenerator`] - Produces base62 [`Token`]s of a requested length
//!
//! # Algorithms
//!
//! [`GeneratorMode::Legacy48`] draws exactly six bytes, reads them as a
//! big-endian 48-bit integer and peels off `length` base62 digits, writing
//! the most significant digit first. Every token ever issued by earlier
//! deployments was produced this way, so it stays the default. The output
//! space is capped at 2^48 values: for `length > 8` the leading positions
//! are heavily biased (with the default length of 10 the first character
//! is always `0`).
//!
//! [`GeneratorMode::Uniform`] draws one byte per character and rejects
//! bytes `>= 248` (the largest multiple of 62 that fits in a byte), giving
//! a uniform distribution over 62^length. Switching to it changes the
//! shape of newly issued tokens and must be an explicit choice.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Token;

/// Symbols a token may contain, in digit order.
pub const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of every issued token.
pub const TOKEN_LENGTH: usize = 10;

/// Bytes of entropy consumed per token in [`GeneratorMode::Legacy48`].
pub const ENTROPY_BYTES: usize = 6;

const BASE: u64 = BASE62_ALPHABET.len() as u64;

/// Bytes at or above this value are rejected in [`GeneratorMode::Uniform`].
const UNIFORM_REJECT_THRESHOLD: u8 = 248;

/// Refills allowed per token before the source is declared unusable.
const UNIFORM_MAX_REFILLS: usize = 64;

/// Error type for token generation.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The secure random source could not supply bytes.
    #[error("secure entropy unavailable: {message}")]
    EntropyUnavailable { message: String },

    /// A zero-length token was requested.
    #[error("token length must be positive")]
    InvalidLength,
}

/// A source of cryptographically secure random bytes.
pub trait EntropySource: Send + Sync {
    /// Fill `dest` entirely with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), GenerateError>;
}

/// Entropy from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), GenerateError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| GenerateError::EntropyUnavailable {
                message: e.to_string(),
            })
    }
}

/// Digit-extraction algorithm used by [`TokenGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorMode {
    /// Modulo extraction from a single 48-bit draw. Compatible with
    /// previously issued tokens.
    #[default]
    Legacy48,

    /// One rejection-sampled byte per character.
    Uniform,
}

/// Generates base62 tokens from an [`EntropySource`].
#[derive(Clone)]
pub struct TokenGenerator {
    source: Arc<dyn EntropySource>,
    mode: GeneratorMode,
}

impl TokenGenerator {
    /// Create a generator backed by [`OsEntropy`] in the default mode.
    pub fn new() -> Self {
        Self::with_source(OsEntropy)
    }

    /// Create a generator backed by a custom entropy source.
    pub fn with_source(source: impl EntropySource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            mode: GeneratorMode::default(),
        }
    }

    /// Select the digit-extraction algorithm.
    pub fn with_mode(mut self, mode: GeneratorMode) -> Self {
        self.mode = mode;
        self
    }

    /// The active algorithm.
    pub fn mode(&self) -> GeneratorMode {
        self.mode
    }

    /// Generate a token of exactly `length` characters.
    pub fn generate(&self, length: usize) -> Result<Token, GenerateError> {
        if length == 0 {
            return Err(GenerateError::InvalidLength);
        }

        let value = match self.mode {
            GeneratorMode::Legacy48 => self.generate_legacy(length)?,
            GeneratorMode::Uniform => self.generate_uniform(length)?,
        };

        Ok(Token::from_generated(value))
    }

    fn generate_legacy(&self, length: usize) -> Result<String, GenerateError> {
        let mut bytes = [0u8; ENTROPY_BYTES];
        self.source.fill(&mut bytes)?;

        let mut number = bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

        // Digits come out least significant first; fill from the back.
        let mut digits = vec![0u8; length];
        for slot in digits.iter_mut().rev() {
            *slot = BASE62_ALPHABET[(number % BASE) as usize];
            number /= BASE;
        }

        Ok(digits.into_iter().map(char::from).collect())
    }

    fn generate_uniform(&self, length: usize) -> Result<String, GenerateError> {
        let mut out = String::with_capacity(length);
        // Roughly 3% of bytes are rejected; oversize the batch a little.
        let mut batch = vec![0u8; length + length / 8 + 4];

        let mut refills = 0;
        while out.len() < length {
            if refills == UNIFORM_MAX_REFILLS {
                return Err(GenerateError::EntropyUnavailable {
                    message: format!("no usable bytes after {} refills", UNIFORM_MAX_REFILLS),
                });
            }
            refills += 1;
            self.source.fill(&mut batch)?;
            for &b in &batch {
                if b >= UNIFORM_REJECT_THRESHOLD {
                    continue;
                }
                out.push(char::from(BASE62_ALPHABET[(b % BASE as u8) as usize]));
                if out.len() == length {
                    break;
                }
            }
        }

        Ok(out)
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGenerator")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Generate a token with OS entropy and the default algorithm.
pub fn generate_token(length: usize) -> Result<Token, GenerateError> {
    TokenGenerator::new().generate(length)
}
