use crate::merkle::MerkleError;

#[derive(thiserror::Error, Debug)]
/// Errors that can arise while building deposits or working with the mock chain.
pub enum Error {
    /// A secret key could not be parsed as a BLS12-381 scalar.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
    /// The operator asked for more deposits than are left to send.
    #[error("insufficient deposits: requested {requested}, available {available}")]
    InsufficientDeposits { requested: usize, available: usize },
    /// A block tag or number could not be parsed.
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),
    /// The configured start block exceeds the synthetic history cap.
    #[error("history too long: start block {requested}, at most {max}")]
    HistoryTooLong { requested: u64, max: u64 },
    /// A block header lookup missed.
    #[error("not found")]
    NotFound,
    /// The deposit tree cannot take any more leaves.
    #[error("merkle error: {0}")]
    Merkle(MerkleError),
    /// The deposit cache could not be read or written.
    #[error("deposit cache error: {0}")]
    Cache(String),
    /// The validator key file could not be read.
    #[error("key file error: {0}")]
    KeyFile(String),
}

impl From<MerkleError> for Error {
    fn from(val: MerkleError) -> Self {
        Error::Merkle(val)
    }
}
