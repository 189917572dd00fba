//! Top-level error types for lkp.

use thiserror::Error;

use crate::store::StoreError;
use crate::token::TokenError;

/// Top-level error type encompassing all lkp errors.
#[derive(Debug, Error)]
pub enum LkpError {
    /// Error from token issuance.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Error opening or querying registration storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
