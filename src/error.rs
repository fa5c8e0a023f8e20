use crate::amount::AmountError;
use thiserror::Error;

/// Failures of a single transaction build, sign or submit.
///
/// Amounts are carried pre-rendered with the asset's decimal places so the
/// message reads the same as the wallet's own display.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("[{account}] {symbol} balance {available} is not enough, {required} required")]
    InsufficientBalance {
        account: String,
        symbol: String,
        available: String,
        required: String,
    },

    #[error("[{account}] {symbol} spendable balance {spendable} is not enough, {required} required (unconfirmed outputs excluded)")]
    InsufficientSpendableFunds {
        account: String,
        symbol: String,
        spendable: String,
        required: String,
    },

    #[error("[{account}] {symbol} total token balance {available} is not enough, {required} required")]
    InsufficientTokenBalance {
        account: String,
        symbol: String,
        available: String,
        required: String,
    },

    #[error("address [{address}] available {symbol} {available} is less than total cost {required}")]
    InsufficientFees {
        address: String,
        symbol: String,
        available: String,
        required: String,
    },

    #[error("transaction uses {count} inputs, more than the maximum {max}")]
    TooManyInputs { count: usize, max: usize },

    #[error("transaction has no inputs")]
    EmptyInputSet,

    #[error("receiver addresses are empty")]
    EmptyDestinationSet,

    #[error("receiver address {0} is listed more than once")]
    RepeatedDestination(String),

    #[error("[{0}] has no addresses")]
    AccountHasNoAddresses(String),

    #[error("address {0} is not known to the address book")]
    UnknownAddress(String),

    #[error("{symbol} does not support token overlay transfers")]
    OverlayUnsupported { symbol: String },

    #[error("token overlay transfer does not support multiple receiver addresses")]
    OverlayMultiRecipientUnsupported,

    #[error("invalid sweep parameters: {0}")]
    InvalidSweepParameters(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("transaction signature is empty: {0}")]
    MissingSignature(String),

    #[error("can't derive key of address {address} at path {path}: {reason}")]
    KeyDerivationFailed {
        address: String,
        path: String,
        reason: String,
    },

    #[error("transaction hash sign failed: {0}")]
    SigningFailed(String),

    #[error("create transaction failed: {0}")]
    EncodingFailed(String),

    #[error("transaction is not completed validation")]
    NotVerified,

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl BuildError {
    /// Whether the error is about funds rather than a malformed request.
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            BuildError::InsufficientBalance { .. }
                | BuildError::InsufficientSpendableFunds { .. }
                | BuildError::InsufficientTokenBalance { .. }
                | BuildError::InsufficientFees { .. }
        )
    }
}
