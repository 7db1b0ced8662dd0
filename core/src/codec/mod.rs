//! Message Codec — prefix compression + pairwise symmetric encryption
//!
//! Pipeline for an outbound message:
//! 1. `huffman::encode(text)` → bit-string + per-message code table
//! 2. shared key for the (sender, recipient) pair, agreed once and cached
//! 3. `encrypt::seal(bit-string, key)` → hex ciphertext
//!
//! The bit-string and table are surfaced next to the ciphertext so a
//! receiver can show every stage, not just the final plaintext.
//!
//! Tree construction and key agreement are CPU-bound; the `*_offloaded`
//! variants run them on the bounded [`WorkerPool`].

pub mod encrypt;
pub mod huffman;
pub mod keys;
pub mod pool;

pub use huffman::CodeTable;
pub use keys::{CityPair, KeyAgreement, ModExpAgreement, SharedKey, SharedKeyCache};
pub use pool::WorkerPool;

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Codec error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Malformed bit-string: unexpected character at position {position}")]
    MalformedBits { position: usize },
    #[error("Bit-string ends with {0} bits that match no code")]
    TrailingBits(usize),
    #[error("Invalid code table: {0}")]
    InvalidTable(String),
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error("No shared key for {0}")]
    MissingKey(String),
    #[error("Key agreement failed: {0}")]
    KeyAgreement(String),
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Output of [`MessageCodec::encrypt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// hex(nonce || ciphertext)
    pub ciphertext: String,
    /// Compressed form that was encrypted
    pub bitstring: String,
    pub table: CodeTable,
}

/// Every intermediate stage of a successful decrypt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptTrace {
    /// Bit-string recovered by the AEAD step, before decompression
    pub intermediate: String,
    pub plaintext: String,
}

/// Compression + encryption facade with an owned shared-key cache
#[derive(Clone)]
pub struct MessageCodec {
    agreement: Arc<dyn KeyAgreement>,
    keys: SharedKeyCache,
    pool: WorkerPool,
}

impl MessageCodec {
    /// Codec with the default agreement scheme and `workers` pool permits
    pub fn new(workers: usize) -> Self {
        Self::with_agreement(Arc::new(ModExpAgreement::new()), workers)
    }

    pub fn with_agreement(agreement: Arc<dyn KeyAgreement>, workers: usize) -> Self {
        Self {
            agreement,
            keys: SharedKeyCache::new(),
            pool: WorkerPool::new(workers),
        }
    }

    pub fn encode(&self, text: &str) -> (String, CodeTable) {
        huffman::encode(text)
    }

    pub fn decode(&self, bits: &str, table: &CodeTable) -> Result<String, CodecError> {
        huffman::decode(bits, table)
    }

    /// Cached key for the pair, if one has been agreed
    pub fn shared_key(&self, a: &str, b: &str) -> Option<SharedKey> {
        self.keys.get(&CityPair::new(a, b))
    }

    /// Key for the unordered pair (a, b), agreeing one on first use.
    pub fn establish_shared_key(&self, a: &str, b: &str) -> Result<SharedKey, CodecError> {
        let pair = CityPair::new(a, b);
        if let Some(key) = self.keys.get(&pair) {
            return Ok(key);
        }

        debug!("Agreeing shared key for {}", pair);
        let key = self.agreement.agree(&pair)?;
        Ok(self.keys.insert_if_absent(pair, key))
    }

    /// Compress then seal `text`.
    pub fn encrypt(&self, text: &str, key: &SharedKey) -> Result<Sealed, CodecError> {
        let (bitstring, table) = huffman::encode(text);
        let ciphertext = encrypt::seal(bitstring.as_bytes(), key)?;
        Ok(Sealed {
            ciphertext,
            bitstring,
            table,
        })
    }

    /// Open then decompress, keeping the intermediate bit-string.
    ///
    /// Malformed ciphertext, authentication and decode failures all surface
    /// as [`CodecError::Decryption`]; nothing partial is returned.
    pub fn decrypt_traced(
        &self,
        ciphertext: &str,
        key: &SharedKey,
        table: &CodeTable,
    ) -> Result<DecryptTrace, CodecError> {
        let opened = encrypt::open(ciphertext, key).map_err(|e| match e {
            CodecError::InvalidCiphertext(reason) => CodecError::Decryption(reason),
            other => other,
        })?;
        let intermediate = String::from_utf8(opened)
            .map_err(|_| CodecError::Decryption("recovered bit-string is not UTF-8".to_string()))?;
        let plaintext = huffman::decode(&intermediate, table)
            .map_err(|e| CodecError::Decryption(e.to_string()))?;
        Ok(DecryptTrace {
            intermediate,
            plaintext,
        })
    }

    pub fn decrypt(
        &self,
        ciphertext: &str,
        key: &SharedKey,
        table: &CodeTable,
    ) -> Result<String, CodecError> {
        self.decrypt_traced(ciphertext, key, table)
            .map(|trace| trace.plaintext)
    }

    // ------------------------------------------------------------------
    // Worker-pool variants
    // ------------------------------------------------------------------

    pub async fn establish_shared_key_offloaded(
        &self,
        a: &str,
        b: &str,
    ) -> Result<SharedKey, CodecError> {
        if let Some(key) = self.shared_key(a, b) {
            return Ok(key);
        }
        let codec = self.clone();
        let (a, b) = (a.to_string(), b.to_string());
        self.pool
            .run(move || codec.establish_shared_key(&a, &b))
            .await
    }

    pub async fn encrypt_offloaded(&self, text: &str, key: SharedKey) -> Result<Sealed, CodecError> {
        let codec = self.clone();
        let text = text.to_string();
        self.pool.run(move || codec.encrypt(&text, &key)).await
    }

    pub async fn decrypt_offloaded(
        &self,
        ciphertext: &str,
        key: SharedKey,
        table: CodeTable,
    ) -> Result<DecryptTrace, CodecError> {
        let codec = self.clone();
        let ciphertext = ciphertext.to_string();
        self.pool
            .run(move || codec.decrypt_traced(&ciphertext, &key, &table))
            .await
    }

    pub fn cached_key_count(&self) -> usize {
        self.keys.len()
    }
}
