use bon::Builder;
use der::Encode;
use rsa::BigUint;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::Certificate;
use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::AuthorityKeyIdentifier;
use crate::cert::params::{ExtensionParam, Validity};
use crate::error::{CertDepotError, Result};
use crate::key::Key;
use crate::tbs_certificate::TbsCertificate;

/// Everything about a certificate that is not decided by its issuer.
///
/// # Fields
/// * `serial_number` - Serial assigned by the issuer's bookkeeping.
/// * `subject` - Subject name, copied as-is into the certificate.
/// * `subject_public_key_info` - The subject's public key.
/// * `validity` - The validity window.
/// * `extensions` - Extensions to include; the authority key identifier is
///   added by the issuer.
#[derive(Clone, Debug, Builder)]
pub struct IssueRequest {
    pub serial_number: BigUint,
    pub subject: Name,
    pub subject_public_key_info: SubjectPublicKeyInfoOwned,
    pub validity: Validity,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    /// Returns the name written as the certificate issuer.
    fn issuer_name(&self) -> Result<Name>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &Key;

    /// Key identifier written into the AuthorityKeyIdentifier extension, if any.
    fn authority_key_id(&self) -> Result<Option<Vec<u8>>>;

    /// Signs a certificate for `request` with SHA-256 and RSA.
    fn issue(&self, request: &IssueRequest) -> Result<Certificate> {
        let mut extensions = request.extensions.clone();
        if let Some(key_identifier) = self.authority_key_id()? {
            let aki = AuthorityKeyIdentifier { key_identifier };
            extensions.push(ExtensionParam::from_extension(&aki, false)?);
        }

        let tbs_cert = TbsCertificate {
            serial_number: request.serial_number.clone(),
            signature_algorithm: SignatureAlgorithm::Sha256WithRSA,
            issuer: self.issuer_name()?,
            validity: request.validity.clone(),
            subject: request.subject.clone(),
            subject_public_key_info: request.subject_public_key_info.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;

        let signature = self
            .signing_key()
            .sign_data(&tbs_cert_inner.to_der()?)
            .map_err(|e| CertDepotError::Signing(e.to_string()))?;

        let cert_inner = CertificateInner {
            signature_algorithm: tbs_cert_inner.signature.clone(),
            tbs_certificate: tbs_cert_inner,
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        tracing::debug!(serial = %request.serial_number, "signed certificate");
        Ok(Certificate::from_der(cert_inner.to_der()?))
    }
}

/// Issuer for self-signed certificates: the subject names itself as issuer.
pub struct SelfIssuer<'a> {
    name: Name,
    key: &'a Key,
}

impl<'a> SelfIssuer<'a> {
    pub fn new(name: Name, key: &'a Key) -> Self {
        Self { name, key }
    }
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<Name> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &Key {
        self.key
    }

    fn authority_key_id(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// A CA certificate together with its private key.
#[derive(Debug, Clone, Copy)]
pub struct CertificateAuthority<'a> {
    pub cert: &'a Certificate,
    pub key: &'a Key,
}

impl<'a> CertificateAuthority<'a> {
    pub fn new(cert: &'a Certificate, key: &'a Key) -> Self {
        Self { cert, key }
    }
}

impl Issuer for CertificateAuthority<'_> {
    fn issuer_name(&self) -> Result<Name> {
        // The name of the issuer is the subject of the certificate
        Ok(self.cert.parsed()?.tbs_certificate.subject.clone())
    }

    fn signing_key(&self) -> &Key {
        self.key
    }

    fn authority_key_id(&self) -> Result<Option<Vec<u8>>> {
        self.cert.subject_key_id()
    }
}
