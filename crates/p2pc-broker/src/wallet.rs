//! Signing identities.
//!
//! An actor signs calls with an Ed25519 keypair; its ledger address is the
//! 32-byte public key, displayed as base58. The all-zero address is the
//! ledger's "nobody" sentinel.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BrokerError, Result};

/// A ledger address (Ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    /// The all-zero sentinel address.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create an address from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create an address from a base58-encoded string.
    ///
    /// # Errors
    ///
    /// Returns error if the string is not valid base58 or wrong length.
    pub fn from_base58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| BrokerError::invalid_address(format!("invalid base58: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Create an address from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns error if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            BrokerError::invalid_address(format!("address must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }

    /// Raw bytes of the address.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the all-zero sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Verify an Ed25519 signature made by the key behind this address.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify_strict(message, &Signature::from_bytes(signature))
            .is_ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base58(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(de::Error::custom)
    }
}

/// A capability that signs prepared calls on behalf of one address.
pub trait Signer: Send + Sync {
    /// The address signatures are attributed to.
    fn address(&self) -> &Address;

    /// Sign a message.
    fn sign(&self, message: &[u8]) -> [u8; 64];
}

/// An Ed25519 keypair usable as a [`Signer`].
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Generate a new random wallet from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut secret_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut secret_bytes);
        Self::from_signing_key(SigningKey::from_bytes(&secret_bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::new(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Create a wallet from a 32-byte secret key.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not 32 bytes.
    pub fn from_secret_key(secret: &[u8]) -> Result<Self> {
        let secret: [u8; 32] = secret.try_into().map_err(|_| BrokerError::Wallet {
            message: format!("secret key must be 32 bytes, got {}", secret.len()),
        })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret)))
    }

    /// Create a wallet from a base58-encoded secret key.
    ///
    /// # Errors
    ///
    /// Returns error if the key is invalid.
    pub fn from_base58_secret(secret: &str) -> Result<Self> {
        let bytes = bs58::decode(secret).into_vec().map_err(|e| BrokerError::Wallet {
            message: format!("invalid base58: {e}"),
        })?;
        Self::from_secret_key(&bytes)
    }

    /// Load a wallet from a JSON keyfile (64-byte array: secret then public).
    ///
    /// # Errors
    ///
    /// Returns error if the file doesn't exist or is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let bytes: Vec<u8> = serde_json::from_str(&contents)?;

        if bytes.len() != 64 {
            return Err(BrokerError::Wallet {
                message: format!("wallet file must contain 64 bytes, got {}", bytes.len()),
            });
        }

        let wallet = Self::from_secret_key(&bytes[..32])?;
        if wallet.address.as_bytes()[..] != bytes[32..] {
            return Err(BrokerError::Wallet {
                message: "public key in wallet file does not match secret key".to_string(),
            });
        }
        Ok(wallet)
    }

    /// Save the wallet as a JSON keyfile.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(self.signing_key.as_bytes());
        bytes.extend_from_slice(self.address.as_bytes());
        std::fs::write(path, serde_json::to_string(&bytes)?)?;
        Ok(())
    }

    /// Get the public key.
    #[must_use]
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Get the secret key as base58.
    #[must_use]
    pub fn secret_key_base58(&self) -> String {
        bs58::encode(self.signing_key.as_bytes()).into_string()
    }
}

impl Signer for Wallet {
    fn address(&self) -> &Address {
        &self.address
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
