//! Unencrypted validator key file.
//!
//! ```json
//! { "keys": [ { "validator_key": "<hex>", "withdrawal_key": "<hex>" } ] }
//! ```

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw secret keys of one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    #[serde(with = "hex")]
    pub validator_key: Vec<u8>,
    #[serde(with = "hex")]
    pub withdrawal_key: Vec<u8>,
}

impl KeyPair {
    pub fn new(validator_key: Vec<u8>, withdrawal_key: Vec<u8>) -> Self {
        Self { validator_key, withdrawal_key }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyFile {
    pub keys: Vec<KeyPair>,
}

impl KeyFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::KeyFile(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content).map_err(|e| Error::KeyFile(e.to_string()))
    }
}
