// Pairwise key agreement and the process-lifetime shared-key cache
//
// Agreement is behind the `KeyAgreement` trait. The default `ModExpAgreement`
// is a textbook finite-field exchange with both exponents generated locally;
// it demonstrates the commutative exponentiation step and offers no secrecy
// against anyone who can observe the process. Swap the implementation, not the
// call sites, when a real primitive is needed.

use super::CodecError;
use num_bigint::BigUint;
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// KDF context for turning an agreed group element into a symmetric key.
/// Changing this invalidates every cached key's derivation.
const KDF_CONTEXT: &str = "citynet relay pairwise key 2026-10-01";

/// Unordered pair of city identities, stored lexicographically smaller first
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CityPair {
    low: String,
    high: String,
}

impl CityPair {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}

impl fmt::Display for CityPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// 32-byte symmetric key shared by a city pair
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Produces the symmetric key for a city pair
pub trait KeyAgreement: Send + Sync {
    fn agree(&self, pair: &CityPair) -> Result<SharedKey, CodecError>;
}

/// Finite-field exchange over p = 2^256 − 189 with generator 2
pub struct ModExpAgreement {
    modulus: BigUint,
    generator: BigUint,
}

impl ModExpAgreement {
    pub fn new() -> Self {
        Self {
            modulus: (BigUint::from(1u8) << 256usize) - BigUint::from(189u8),
            generator: BigUint::from(2u8),
        }
    }

    fn random_exponent() -> BigUint {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let exponent = BigUint::from_bytes_be(&bytes);
        bytes.zeroize();
        exponent
    }
}

impl Default for ModExpAgreement {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyAgreement for ModExpAgreement {
    fn agree(&self, pair: &CityPair) -> Result<SharedKey, CodecError> {
        let a = Self::random_exponent();
        let b = Self::random_exponent();

        let public_a = self.generator.modpow(&a, &self.modulus);
        let public_b = self.generator.modpow(&b, &self.modulus);

        let shared_a = public_b.modpow(&a, &self.modulus);
        let shared_b = public_a.modpow(&b, &self.modulus);
        if shared_a != shared_b {
            return Err(CodecError::KeyAgreement(format!(
                "exchange for {} did not converge",
                pair
            )));
        }

        let raw = shared_a.to_bytes_be();
        if raw.len() > 32 {
            return Err(CodecError::KeyAgreement(format!(
                "shared value for {} exceeds 256 bits",
                pair
            )));
        }
        let mut secret = [0u8; 32];
        secret[32 - raw.len()..].copy_from_slice(&raw);

        let key = SharedKey(blake3::derive_key(KDF_CONTEXT, &secret));
        secret.zeroize();
        Ok(key)
    }
}

/// Canonical-pair → key cache. Entries never expire.
#[derive(Clone, Default)]
pub struct SharedKeyCache {
    keys: Arc<RwLock<HashMap<CityPair, SharedKey>>>,
}

impl SharedKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &CityPair) -> Option<SharedKey> {
        self.keys.read().get(pair).cloned()
    }

    /// Store `key` unless the pair already has one; returns the stored key.
    ///
    /// Two racing derivations for the same pair therefore agree on whichever
    /// finished first.
    pub fn insert_if_absent(&self, pair: CityPair, key: SharedKey) -> SharedKey {
        let mut keys = self.keys.write();
        let stored = keys.entry(pair).or_insert_with(|| {
            debug!("Cached new shared key");
            key
        });
        stored.clone()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}
