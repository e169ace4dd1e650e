//! The consent access error domain.
//!
//! Every failure of a pull is mapped to exactly one [Error] variant before it
//! reaches the caller. Variants carry the integer code of the digi.me error
//! domain so that hosts can keep comparing against the published codes.

use crate::state::OperationState;

/// Namespace of the error codes returned by [Error::code].
pub const ERROR_DOMAIN: &str = "me.digi.digime.pa";

/// Errors surfaced by a consent access pull.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown error")]
    Unknown,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("illegal state transition from {from} to {to}")]
    InvalidStateTransition {
        from: OperationState,
        to: OperationState,
    },
    #[error("the request was cancelled")]
    UserCancelled,

    #[error("session could not be created: {0}")]
    SessionCreateUnknown(String),
    #[error("session create response could not be parsed")]
    SessionCreateBadResponse,
    #[error("session create response did not contain a session key")]
    SessionKeyNotReceived,
    #[error("the application id has been revoked")]
    AppIdRevoked,
    #[error("the contract has expired")]
    ContractExpired,

    #[error("contract request failed")]
    ContractRequestUnknown,
    #[error("data request failed")]
    DataRequestUnknown,

    #[error("data retrieval failed")]
    DataGetUnknown,
    #[error("file {file} decrypted to no data")]
    DataIsNull { file: String },
    #[error("file list request failed: {0}")]
    FilesListServerError(String),
    #[error("file list response could not be parsed")]
    FilesListDataIncorrect,
    #[error("request for file {file} failed: {reason}")]
    FileDataServerError { file: String, reason: String },
    #[error("content of file {file} could not be parsed")]
    FileDataDataIncorrect { file: String },

    #[error("communication with the digi.me app failed")]
    HandoffUnknown,
    #[error("no response from the digi.me app within the handoff timeout")]
    HandoffTimedOut,
    #[error("the digi.me app is not available")]
    AppNotAvailable,
    #[error("the digi.me app reported a failure")]
    HandoffResultFailed,
    #[error("the digi.me app response did not contain the expected data")]
    HandoffDataIsNull,
    #[error("the url scheme does not belong to this application")]
    SchemeMismatch,
    #[error("the request was rejected by the user")]
    RejectedByUser,
    #[error("the session key returned by the digi.me app does not match the current session")]
    SessionKeyMismatch,

    #[error("the rsa private key is invalid or could not decrypt the data")]
    RsaPrivateKeyInvalid,
}

impl Error {
    pub const CODE_UNKNOWN: i64 = 700000;
    pub const CODE_USER_CANCELLED: i64 = 700001;

    /// Numeric code within [ERROR_DOMAIN].
    ///
    /// Codes are grouped by phase: session create `710xxx`, contract `720xxx`,
    /// data request `730xxx`, data get `740xxx`, app communication `750xxx`
    /// and security `760xxx`.
    pub fn code(&self) -> i64 {
        match self {
            Error::Unknown | Error::InvalidArgument(_) | Error::InvalidStateTransition { .. } => {
                Self::CODE_UNKNOWN
            }
            Error::UserCancelled => Self::CODE_USER_CANCELLED,

            Error::SessionCreateUnknown(_) => 710000,
            Error::SessionCreateBadResponse => 710001,
            Error::SessionKeyNotReceived => 710002,
            Error::AppIdRevoked => 710403,
            Error::ContractExpired => 710410,

            Error::ContractRequestUnknown => 720000,
            Error::DataRequestUnknown => 730000,

            Error::DataGetUnknown => 740000,
            Error::DataIsNull { .. } => 740001,
            Error::FilesListServerError(_) => 740002,
            Error::FilesListDataIncorrect => 740003,
            Error::FileDataServerError { .. } => 740004,
            Error::FileDataDataIncorrect { .. } => 740005,

            Error::HandoffUnknown | Error::HandoffTimedOut => 750000,
            Error::AppNotAvailable => 750001,
            Error::HandoffResultFailed => 750002,
            Error::HandoffDataIsNull => 750003,
            Error::SchemeMismatch => 750004,
            Error::RejectedByUser => 750005,
            Error::SessionKeyMismatch => 750006,

            Error::RsaPrivateKeyInvalid => 760000,
        }
    }

    pub fn domain(&self) -> &'static str {
        ERROR_DOMAIN
    }

    /// Whether the pull that produced this error was ended by the user rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::UserCancelled | Error::RejectedByUser)
    }
}
