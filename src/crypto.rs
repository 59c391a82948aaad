//! DES-ECB challenge cipher used by the high-privilege login.
//!
//! ECB with no IV is deterministic: the same passphrase under the same key
//! always yields the same ciphertext, which is exactly what the login
//! comparison relies on. Do not reuse this for confidentiality.

use des::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyInit};
use thiserror::Error;

type DesEcbEnc = ecb::Encryptor<des::Des>;

pub const KEY_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid DES key length: {0} (need 8 bytes)")]
    InvalidKeyLength(usize),
    #[error("invalid hex string")]
    InvalidHex,
}

/// DES-ECB with PKCS#7 padding; output length is the next multiple of 8.
pub fn des_encrypt_ecb_pkcs7(plain: &[u8], key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let encryptor =
        DesEcbEnc::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plain))
}

/// Ciphertext as uppercase hex
pub fn des_encrypt_hex(plain: &[u8], key: &[u8]) -> Result<String, CipherError> {
    des_encrypt_ecb_pkcs7(plain, key).map(|ct| bytes_to_hex(&ct))
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Accepts either case; odd length or non-hex digits fail.
pub fn hex_to_bytes(text: &str) -> Result<Vec<u8>, CipherError> {
    hex::decode(text).map_err(|_| CipherError::InvalidHex)
}

pub fn parse_key(text: &str) -> Result<[u8; KEY_LEN], CipherError> {
    let bytes = hex_to_bytes(text)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CipherError::InvalidKeyLength(bytes.len()))
}
