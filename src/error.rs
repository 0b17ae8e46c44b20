//! The error type shared by every module.

use thiserror::Error;

/// Represents errors that can occur in the certdepot library.
///
/// Parsing, cryptographic and storage failures are all reported through this
/// enum; none of the operations retry or recover internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertDepotError {
    /// Malformed PEM/DER container (missing block, wrong type, unexpected headers).
    #[error("Format error: {0}")]
    FormatError(String),

    /// Well-formed container with a malformed inner structure.
    #[error("Failed to parse: {0}")]
    ParseError(String),

    /// A certificate block carried more than one certificate.
    #[error("Unsupported multiple certificates in a block")]
    MultipleCertificates,

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Signature verification failed.
    #[error("Signature error: {0}")]
    SignatureError(String),

    /// The certificate does not chain to the authority for the requested name.
    #[error("Chain verification error: {0}")]
    ChainError(String),

    /// Wrong passphrase or corrupted encrypted key.
    #[error("Failed to decrypt private key: {0}")]
    DecryptionError(String),

    /// Valid but unhandled signature or cipher algorithm.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Only RSA keys are handled for key identifiers and signing.
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The key has no private component.
    #[error("Key has no private component")]
    MissingPrivateKey,

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// The request subject has no identifying field.
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    /// The certificate signing request could not be read while issuing.
    #[error("Failed to parse certificate request: {0}")]
    CsrParse(String),

    /// The subject key identifier could not be derived while issuing.
    #[error("Failed to generate subject key id: {0}")]
    KeyId(String),

    /// Signing a certificate failed.
    #[error("Failed to sign certificate: {0}")]
    Signing(String),

    /// An artifact with this name is already stored.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// No artifact with this name is stored.
    #[error("{0} does not exist")]
    NotFound(String),

    /// The stored artifact does not carry the permission bits its tag requires.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation attempted in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    StateError(String),

    /// Filesystem failure not covered by the storage variants.
    #[error("I/O error: {0}")]
    Io(String),

    /// Remote key/value backend failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Unusable depot configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CertDepotError>;

impl From<der::Error> for CertDepotError {
    /// Converts a `der::Error` into a `CertDepotError`.
    fn from(err: der::Error) -> Self {
        CertDepotError::ParseError(err.to_string())
    }
}

impl From<rsa::Error> for CertDepotError {
    fn from(err: rsa::Error) -> Self {
        CertDepotError::SignatureError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for CertDepotError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        CertDepotError::ParseError(err.to_string())
    }
}

impl From<pem::PemError> for CertDepotError {
    fn from(err: pem::PemError) -> Self {
        CertDepotError::FormatError(err.to_string())
    }
}

impl From<serde_json::Error> for CertDepotError {
    fn from(err: serde_json::Error) -> Self {
        CertDepotError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for CertDepotError {
    fn from(err: reqwest::Error) -> Self {
        CertDepotError::Backend(err.to_string())
    }
}

impl From<std::io::Error> for CertDepotError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::AlreadyExists => CertDepotError::AlreadyExists(err.to_string()),
            std::io::ErrorKind::NotFound => CertDepotError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                CertDepotError::PermissionDenied(err.to_string())
            }
            _ => CertDepotError::Io(err.to_string()),
        }
    }
}
