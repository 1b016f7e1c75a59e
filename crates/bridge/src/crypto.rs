// crates/bridge/src/crypto.rs
//! Webhook payload cipher. The service encrypts each notification with
//! AES-256-CBC: the key is the raw client secret, the IV is the client id
//! truncated or zero-padded to 16 bytes, and the ciphertext arrives base64
//! encoded with PKCS#7 padding.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("invalid base64 in dataEncrypt: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("client secret must be 32 bytes for AES-256")]
    KeyLength,
    #[error("decryption failed: bad padding or ciphertext")]
    Padding,
    #[error("decrypted payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// The IV is the client id's bytes, truncated past 16 or zero-padded up
/// to it.
fn derive_iv(client_id: &str) -> [u8; 16] {
    let mut iv = [0u8; 16];
    let bytes = client_id.as_bytes();
    let n = bytes.len().min(16);
    iv[..n].copy_from_slice(&bytes[..n]);
    iv
}

pub fn decrypt_payload(
    data_encrypt: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, DecryptError> {
    let ciphertext = STANDARD.decode(data_encrypt)?;
    let iv = derive_iv(client_id);
    let cipher = Aes256CbcDec::new_from_slices(client_secret.as_bytes(), &iv)
        .map_err(|_| DecryptError::KeyLength)?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| DecryptError::Padding)?;
    Ok(String::from_utf8(plaintext)?)
}

#[cfg(test)]
pub(crate) fn encrypt_payload(plaintext: &str, client_id: &str, client_secret: &str) -> String {
    use aes::cipher::BlockEncryptMut;
    type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

    let iv = derive_iv(client_id);
    let cipher = Aes256CbcEnc::new_from_slices(client_secret.as_bytes(), &iv)
        .expect("test key must be 32 bytes");
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    STANDARD.encode(ciphertext)
}
