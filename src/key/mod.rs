//! RSA key pairs and the public keys read back out of certificates and requests.

pub mod encrypted;

use std::fmt;

use const_oid::ObjectIdentifier;
use der::{Encode, Tag, Tagged};
use pkcs8::DecodePublicKey;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey,
};
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::signature::{SignatureEncoding, Signer as RsaSigner};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::Zeroizing;

use crate::error::{CertDepotError, Result};
use crate::pem_utils::{RSA_PRIVATE_KEY_LABEL, der_to_pem, parse_single_block, pem_to_der};

/// Key size used for host keys when the caller does not pick one.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// An RSA key pair, or just its public half.
///
/// The PKCS#1 encoding of an imported private key is kept so that exporting it
/// again reproduces the original bytes.
#[derive(Clone)]
pub struct Key {
    public: RsaPublicKey,
    private: Option<Box<RsaPrivateKey>>,
    private_der: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use rsa::traits::PublicKeyParts;
        f.debug_struct("Key")
            .field("bits", &(self.public.size() * 8))
            .field("has_private", &self.private.is_some())
            .finish()
    }
}

impl Key {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate(bits: usize) -> Result<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CertDepotError::KeyGenerationError(e.to_string()))?;
        tracing::debug!(bits, "generated RSA key");
        Ok(Self::from_private(private))
    }

    /// Wraps an existing private key.
    pub fn from_private(private: RsaPrivateKey) -> Self {
        Key {
            public: RsaPublicKey::from(&private),
            private: Some(Box::new(private)),
            private_der: None,
        }
    }

    /// Wraps a public key; the result cannot sign or export a private PEM.
    pub fn from_public(public: RsaPublicKey) -> Self {
        Key {
            public,
            private: None,
            private_der: None,
        }
    }

    /// Parses a PKCS#1 `RSA PRIVATE KEY` PEM block without headers.
    pub fn from_private_pem(data: &[u8]) -> Result<Self> {
        let der = Zeroizing::new(pem_to_der(data, RSA_PRIVATE_KEY_LABEL)?);
        Self::from_pkcs1_der(der)
    }

    /// Parses a PKCS#1 private key PEM block that may be passphrase-encrypted.
    ///
    /// Unencrypted blocks are accepted whatever the passphrase.
    pub fn from_encrypted_private_pem(data: &[u8], passphrase: &[u8]) -> Result<Self> {
        let block = parse_single_block(data)?;
        if block.tag() != RSA_PRIVATE_KEY_LABEL {
            return Err(CertDepotError::FormatError(format!(
                "unmatched type: expected {RSA_PRIVATE_KEY_LABEL}, found {}",
                block.tag()
            )));
        }
        if !encrypted::is_encrypted(&block) {
            return Self::from_private_pem(data);
        }
        let der = encrypted::decrypt_block(&block, passphrase)?;
        // A plaintext that survives unpadding but is not a key means a wrong passphrase.
        Self::from_pkcs1_der(der).map_err(|e| match e {
            CertDepotError::ParseError(msg) => CertDepotError::DecryptionError(msg),
            other => other,
        })
    }

    fn from_pkcs1_der(der: Zeroizing<Vec<u8>>) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_der(&der)
            .map_err(|e| CertDepotError::ParseError(e.to_string()))?;
        Ok(Key {
            public: RsaPublicKey::from(&private),
            private: Some(Box::new(private)),
            private_der: Some(der),
        })
    }

    pub fn has_private(&self) -> bool {
        self.private.is_some()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    fn private_key(&self) -> Result<&RsaPrivateKey> {
        self.private
            .as_deref()
            .ok_or(CertDepotError::MissingPrivateKey)
    }

    fn private_pkcs1_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        if let Some(der) = &self.private_der {
            return Ok(der.clone());
        }
        let document = self
            .private_key()?
            .to_pkcs1_der()
            .map_err(|e| CertDepotError::EncodingError(e.to_string()))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Exports the private key as an unencrypted PKCS#1 PEM block.
    pub fn export_private_pem(&self) -> Result<String> {
        let der = self.private_pkcs1_der()?;
        Ok(der_to_pem(&der, RSA_PRIVATE_KEY_LABEL))
    }

    /// Exports the private key as an AES-256-CBC encrypted PEM block.
    ///
    /// An empty passphrase produces the same output as [`Key::export_private_pem`].
    pub fn export_encrypted_private_pem(&self, passphrase: &[u8]) -> Result<String> {
        if passphrase.is_empty() {
            return self.export_private_pem();
        }
        let der = self.private_pkcs1_der()?;
        encrypted::encrypt_pem(&der, RSA_PRIVATE_KEY_LABEL, passphrase)
    }

    /// 160-bit SHA-1 hash of the PKCS#1 encoding of the public key.
    pub fn subject_key_id(&self) -> Result<Vec<u8>> {
        rsa_subject_key_id(&self.public)
    }

    /// The public key as a SubjectPublicKeyInfo structure.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        SubjectPublicKeyInfoOwned::from_key(self.public.clone())
            .map_err(|e| CertDepotError::EncodingError(e.to_string()))
    }

    /// Signs `data` with RSA PKCS#1 v1.5 over SHA-256.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key: RsaSigningKey<Sha256> = RsaSigningKey::new(self.private_key()?.clone());
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| CertDepotError::Signing(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

fn rsa_subject_key_id(public: &RsaPublicKey) -> Result<Vec<u8>> {
    let der = public
        .to_pkcs1_der()
        .map_err(|e| CertDepotError::EncodingError(e.to_string()))?;
    Ok(Sha1::digest(der.as_bytes()).to_vec())
}

/// Public keys found in certificates and certificate requests.
#[derive(Clone, Debug)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Reads a public key out of a SubjectPublicKeyInfo structure.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        match spki.algorithm.oid {
            // rsaEncryption parameters are NULL or, from some encoders, absent
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                if let Some(parameters) = &spki.algorithm.parameters {
                    if parameters.tag() != Tag::Null {
                        return Err(CertDepotError::ParseError(
                            "rsaEncryption parameters must be NULL".to_string(),
                        ));
                    }
                }
                RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes())
                    .map(PublicKey::Rsa)
                    .map_err(|e| CertDepotError::ParseError(e.to_string()))
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let der = spki.to_der()?;
                let curve: ObjectIdentifier = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| {
                        CertDepotError::ParseError("EC public key without curve".to_string())
                    })?
                    .decode_as()?;
                match curve {
                    const_oid::db::rfc5912::SECP_256_R_1 => {
                        p256::ecdsa::VerifyingKey::from_public_key_der(&der)
                            .map(PublicKey::EcdsaP256)
                            .map_err(|e| CertDepotError::ParseError(e.to_string()))
                    }
                    const_oid::db::rfc5912::SECP_384_R_1 => {
                        p384::ecdsa::VerifyingKey::from_public_key_der(&der)
                            .map(PublicKey::EcdsaP384)
                            .map_err(|e| CertDepotError::ParseError(e.to_string()))
                    }
                    other => Err(CertDepotError::UnsupportedKeyType(format!(
                        "EC curve {other}"
                    ))),
                }
            }
            other => Err(CertDepotError::UnsupportedKeyType(other.to_string())),
        }
    }

    /// 160-bit SHA-1 hash of the PKCS#1 encoding of an RSA public key.
    pub fn subject_key_id(&self) -> Result<Vec<u8>> {
        match self {
            PublicKey::Rsa(public) => rsa_subject_key_id(public),
            PublicKey::EcdsaP256(_) | PublicKey::EcdsaP384(_) => Err(
                CertDepotError::UnsupportedKeyType("only RSA public key is supported".to_string()),
            ),
        }
    }
}
