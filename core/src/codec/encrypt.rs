// Symmetric sealing of compressed bit-strings: XChaCha20-Poly1305
//
// Wire form is hex(nonce || ciphertext), 24-byte random nonce per message.
// Authentication failure and any malformed hex are both rejected before a
// single byte of plaintext is returned.

use super::keys::SharedKey;
use super::CodecError;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

const NONCE_LEN: usize = 24;

/// Encrypt `plaintext` under `key`, returning transport-safe hex.
pub fn seal(plaintext: &[u8], key: &SharedKey) -> Result<String, CodecError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CodecError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CodecError::Encryption(e.to_string()))?;

    let mut wire = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    wire.extend_from_slice(&nonce_bytes);
    wire.extend_from_slice(&ciphertext);
    Ok(hex::encode(wire))
}

/// Decrypt hex produced by [`seal`].
pub fn open(ciphertext_hex: &str, key: &SharedKey) -> Result<Vec<u8>, CodecError> {
    let wire = hex::decode(ciphertext_hex)
        .map_err(|e| CodecError::InvalidCiphertext(format!("not hex: {}", e)))?;
    if wire.len() < NONCE_LEN {
        return Err(CodecError::InvalidCiphertext(format!(
            "{} bytes is shorter than the nonce",
            wire.len()
        )));
    }

    let (nonce_bytes, body) = wire.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CodecError::InvalidCiphertext(format!("Failed to create cipher: {}", e)))?;

    cipher
        .decrypt(XNonce::from_slice(nonce_bytes), body)
        .map_err(|_| CodecError::Decryption("invalid ciphertext or wrong key".to_string()))
}
