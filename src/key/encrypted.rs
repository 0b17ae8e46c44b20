//! RFC 1423 ("traditional OpenSSL") PEM encryption for private keys.
//!
//! The block carries `Proc-Type: 4,ENCRYPTED` and `DEK-Info: <cipher>,<hex iv>`
//! headers. The symmetric key is derived from the passphrase with the MD5
//! based `EVP_BytesToKey` scheme, salted with the first eight bytes of the IV.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand_core::RngCore;
use zeroize::Zeroizing;

use crate::error::{CertDepotError, Result};
use crate::pem_utils::der_to_pem_with_headers;

const PROC_TYPE: &str = "Proc-Type";
const DEK_INFO: &str = "DEK-Info";
const ENCRYPTED_PROC_TYPE: &str = "4,ENCRYPTED";
const SALT_LEN: usize = 8;

/// Block ciphers accepted in the `DEK-Info` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemCipher {
    DesCbc,
    DesEde3Cbc,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl PemCipher {
    pub fn name(self) -> &'static str {
        match self {
            PemCipher::DesCbc => "DES-CBC",
            PemCipher::DesEde3Cbc => "DES-EDE3-CBC",
            PemCipher::Aes128Cbc => "AES-128-CBC",
            PemCipher::Aes192Cbc => "AES-192-CBC",
            PemCipher::Aes256Cbc => "AES-256-CBC",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            PemCipher::DesCbc,
            PemCipher::DesEde3Cbc,
            PemCipher::Aes128Cbc,
            PemCipher::Aes192Cbc,
            PemCipher::Aes256Cbc,
        ]
        .into_iter()
        .find(|cipher| cipher.name() == name)
    }

    fn key_size(self) -> usize {
        match self {
            PemCipher::DesCbc => 8,
            PemCipher::DesEde3Cbc => 24,
            PemCipher::Aes128Cbc => 16,
            PemCipher::Aes192Cbc => 24,
            PemCipher::Aes256Cbc => 32,
        }
    }

    fn block_size(self) -> usize {
        match self {
            PemCipher::DesCbc | PemCipher::DesEde3Cbc => 8,
            PemCipher::Aes128Cbc | PemCipher::Aes192Cbc | PemCipher::Aes256Cbc => 16,
        }
    }
}

/// Whether the block carries the RFC 1423 encryption headers.
pub fn is_encrypted(block: &pem::Pem) -> bool {
    block.headers().get(PROC_TYPE) == Some(ENCRYPTED_PROC_TYPE)
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn derive_key(passphrase: &[u8], salt: &[u8], key_size: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(Vec::with_capacity(key_size));
    let mut digest: Vec<u8> = Vec::new();
    while key.len() < key_size {
        let mut hasher = Md5::new();
        hasher.update(&digest);
        hasher.update(passphrase);
        hasher.update(salt);
        digest = hasher.finalize().to_vec();
        let take = digest.len().min(key_size - key.len());
        key.extend_from_slice(&digest[..take]);
    }
    key
}

macro_rules! cbc_decrypt {
    ($cipher:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Decryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| CertDepotError::DecryptionError(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>($data)
            .map_err(|_| CertDepotError::DecryptionError("incorrect passphrase".to_string()))
    };
}

macro_rules! cbc_encrypt {
    ($cipher:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Encryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| CertDepotError::EncodingError(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>($data)
    };
}

fn decrypt(cipher: PemCipher, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    match cipher {
        PemCipher::DesCbc => cbc_decrypt!(des::Des, key, iv, data),
        PemCipher::DesEde3Cbc => cbc_decrypt!(des::TdesEde3, key, iv, data),
        PemCipher::Aes128Cbc => cbc_decrypt!(aes::Aes128, key, iv, data),
        PemCipher::Aes192Cbc => cbc_decrypt!(aes::Aes192, key, iv, data),
        PemCipher::Aes256Cbc => cbc_decrypt!(aes::Aes256, key, iv, data),
    }
}

fn encrypt(cipher: PemCipher, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    Ok(match cipher {
        PemCipher::DesCbc => cbc_encrypt!(des::Des, key, iv, data),
        PemCipher::DesEde3Cbc => cbc_encrypt!(des::TdesEde3, key, iv, data),
        PemCipher::Aes128Cbc => cbc_encrypt!(aes::Aes128, key, iv, data),
        PemCipher::Aes192Cbc => cbc_encrypt!(aes::Aes192, key, iv, data),
        PemCipher::Aes256Cbc => cbc_encrypt!(aes::Aes256, key, iv, data),
    })
}

/// Decrypts the payload of an encrypted PEM block.
pub fn decrypt_block(block: &pem::Pem, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let dek_info = block
        .headers()
        .get(DEK_INFO)
        .ok_or_else(|| CertDepotError::FormatError("missing DEK-Info header".to_string()))?;
    let (name, iv_hex) = dek_info
        .split_once(',')
        .ok_or_else(|| CertDepotError::FormatError("malformed DEK-Info header".to_string()))?;
    let cipher = PemCipher::from_name(name.trim())
        .ok_or_else(|| CertDepotError::UnsupportedAlgorithm(name.to_string()))?;
    let iv = hex::decode(iv_hex.trim())
        .map_err(|e| CertDepotError::FormatError(format!("malformed IV: {e}")))?;
    if iv.len() != cipher.block_size() {
        return Err(CertDepotError::FormatError(
            "IV length does not match cipher block size".to_string(),
        ));
    }

    let data = block.contents();
    if data.is_empty() || data.len() % cipher.block_size() != 0 {
        return Err(CertDepotError::DecryptionError(
            "encrypted data is not a whole number of blocks".to_string(),
        ));
    }

    let key = derive_key(passphrase, &iv[..SALT_LEN], cipher.key_size());
    decrypt(cipher, &key, &iv, data).map(Zeroizing::new)
}

/// Encrypts `der` with AES-256-CBC under a random IV and frames it as PEM.
pub fn encrypt_pem(der: &[u8], label: &str, passphrase: &[u8]) -> Result<String> {
    encrypt_pem_with(PemCipher::Aes256Cbc, der, label, passphrase)
}

pub fn encrypt_pem_with(
    cipher: PemCipher,
    der: &[u8],
    label: &str,
    passphrase: &[u8],
) -> Result<String> {
    let mut iv = vec![0u8; cipher.block_size()];
    rand_core::OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CertDepotError::EncodingError(e.to_string()))?;
    let key = derive_key(passphrase, &iv[..SALT_LEN], cipher.key_size());
    let encrypted = encrypt(cipher, &key, &iv, der)?;
    let dek_info = format!("{},{}", cipher.name(), hex::encode_upper(&iv));
    Ok(der_to_pem_with_headers(
        &encrypted,
        label,
        &[(PROC_TYPE, ENCRYPTED_PROC_TYPE), (DEK_INFO, &dek_info)],
    ))
}
