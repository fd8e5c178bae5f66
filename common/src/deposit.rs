//! Signed deposit records, built the way the consensus specification expects them.

use crate::{
    error::Error,
    keys::KeyPair,
    merkle::{
        fixed::{bytes_root, container_root},
        hash_two, u64_chunk, Hash,
    },
};
use alloy_primitives::{FixedBytes, B256};
use blst::min_pk::{PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// Domain type of deposit signatures.
pub const DOMAIN_DEPOSIT: [u8; 4] = [3, 0, 0, 0];
/// Fork version deposits are signed under.
pub const GENESIS_FORK_VERSION: [u8; 4] = [0, 0, 0, 0];
/// First byte of BLS withdrawal credentials.
pub const BLS_WITHDRAWAL_PREFIX: u8 = 0;
/// Deposit amount of a full validator, in gwei.
pub const MAX_EFFECTIVE_BALANCE: u64 = 32_000_000_000;
/// Ciphersuite of the proof-of-possession BLS scheme used by the beacon chain.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Validator public key (compressed G1 point).
pub type BlsPublicKey = FixedBytes<48>;
/// BLS signature (compressed G2 point).
pub type BlsSignature = FixedBytes<96>;

/// Deposit made to the deposit contract.
///
/// The serialized shape (byte fields base64 encoded) is the one the deposit cache uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    #[serde(with = "base64_bytes")]
    pub pubkey: BlsPublicKey,
    #[serde(with = "base64_bytes")]
    pub withdrawal_credentials: B256,
    /// Amount in gwei.
    pub amount: u64,
    #[serde(with = "base64_bytes")]
    pub signature: BlsSignature,
}

impl DepositRecord {
    /// Builds a deposit signed under the genesis fork version.
    pub fn build(
        validator_secret: &[u8], withdrawal_secret: &[u8], amount: u64,
    ) -> Result<Self, Error> {
        Self::build_for_fork(validator_secret, withdrawal_secret, amount, GENESIS_FORK_VERSION)
    }

    pub fn build_for_fork(
        validator_secret: &[u8], withdrawal_secret: &[u8], amount: u64, fork_version: [u8; 4],
    ) -> Result<Self, Error> {
        let validator_key = parse_secret_key(validator_secret)?;
        let withdrawal_key = parse_secret_key(withdrawal_secret)?;

        let mut record = Self {
            pubkey: BlsPublicKey::from(validator_key.sk_to_pk().compress()),
            withdrawal_credentials: withdrawal_credentials(&withdrawal_key.sk_to_pk()),
            amount,
            signature: BlsSignature::ZERO,
        };
        let signing_root = record.signing_root(fork_version);
        let signature = validator_key.sign(&signing_root.0, BLS_DST, &[]);
        record.signature = BlsSignature::from(signature.compress());
        Ok(record)
    }

    /// Root of the unsigned `DepositMessage` (pubkey, withdrawal credentials, amount).
    pub fn message_root(&self) -> Hash {
        container_root::<Sha256>(vec![
            bytes_root::<Sha256>(self.pubkey.as_slice()),
            Hash(self.withdrawal_credentials.0),
            u64_chunk(self.amount),
        ])
    }

    /// Root of the full `DepositData` container, i.e. the deposit tree leaf.
    pub fn tree_hash_root(&self) -> Hash {
        container_root::<Sha256>(vec![
            bytes_root::<Sha256>(self.pubkey.as_slice()),
            Hash(self.withdrawal_credentials.0),
            u64_chunk(self.amount),
            bytes_root::<Sha256>(self.signature.as_slice()),
        ])
    }

    pub fn signing_root(&self, fork_version: [u8; 4]) -> Hash {
        let domain = compute_domain(DOMAIN_DEPOSIT, fork_version, Hash::default());
        compute_signing_root(self.message_root(), domain)
    }

    /// Checks the signature against the record's own pubkey and signing root.
    pub fn verify_signature(&self, fork_version: [u8; 4]) -> bool {
        let Ok(pubkey) = PublicKey::from_bytes(self.pubkey.as_slice()) else {
            return false;
        };
        let Ok(signature) = Signature::from_bytes(self.signature.as_slice()) else {
            return false;
        };
        let signing_root = self.signing_root(fork_version);
        signature.verify(true, &signing_root.0, BLS_DST, &[], &pubkey, true)
            == BLST_ERROR::BLST_SUCCESS
    }
}

fn parse_secret_key(bytes: &[u8]) -> Result<SecretKey, Error> {
    SecretKey::from_bytes(bytes).map_err(|e| Error::InvalidKeyEncoding(format!("{e:?}")))
}

/// `0x00 ‖ keccak256(withdrawal_pubkey)[1..]`
pub fn withdrawal_credentials(withdrawal_pubkey: &PublicKey) -> B256 {
    let hash = Keccak256::digest(withdrawal_pubkey.compress());
    let mut credentials = [0; 32];
    credentials[0] = BLS_WITHDRAWAL_PREFIX;
    credentials[1..].copy_from_slice(&hash[1..]);
    B256::from(credentials)
}

/// `domain_type ‖ hash_tree_root(ForkData)[..28]`
pub fn compute_domain(
    domain_type: [u8; 4], fork_version: [u8; 4], genesis_validators_root: Hash,
) -> Hash {
    let mut version = [0; 32];
    version[..4].copy_from_slice(&fork_version);
    let fork_data_root = container_root::<Sha256>(vec![Hash(version), genesis_validators_root]);

    let mut domain = [0; 32];
    domain[..4].copy_from_slice(&domain_type);
    domain[4..].copy_from_slice(&fork_data_root.0[..28]);
    Hash(domain)
}

/// Root of the `SigningData` container.
pub fn compute_signing_root(object_root: Hash, domain: Hash) -> Hash {
    hash_two::<Sha256>(object_root, domain)
}

/// Signs one deposit per key pair. Order of the output follows the input.
pub fn build_deposits(
    keys: &[KeyPair], amount: u64, fork_version: [u8; 4],
) -> Result<Vec<DepositRecord>, Error> {
    keys.par_iter()
        .map(|pair| {
            DepositRecord::build_for_fork(
                &pair.validator_key,
                &pair.withdrawal_key,
                amount,
                fork_version,
            )
        })
        .collect()
}

mod base64_bytes {
    use alloy_primitives::FixedBytes;
    use base64::prelude::*;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &FixedBytes<N>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(d: D) -> Result<FixedBytes<N>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(d)?;
        let bytes = BASE64_STANDARD.decode(encoded).map_err(de::Error::custom)?;
        FixedBytes::try_from(bytes.as_slice())
            .map_err(|_| de::Error::invalid_length(bytes.len(), &"a fixed-size byte string"))
    }
}
