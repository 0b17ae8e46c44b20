pub mod extensions;
pub mod params;
pub mod verify;

use std::cell::OnceCell;

use der::asn1::Any;
use der::{Decode, Reader, SliceReader, Tag};
use extensions::{SubjectKeyIdentifier, find_extension};
use params::{DistinguishedName, ExtensionParam, Validity};
use rsa::BigUint;
use time::OffsetDateTime;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{CertDepotError, Result};
use crate::pem_utils::{CERTIFICATE_LABEL, der_to_pem, pem_to_der};

/// ecdsa-with-SHA1 from RFC 5758.
pub const ECDSA_WITH_SHA_1: const_oid::ObjectIdentifier =
    const_oid::ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");

/// Represents the supported signature algorithms for certificates and requests.
///
/// Everything this crate signs uses [`SignatureAlgorithm::Sha256WithRSA`]; the
/// remaining variants are accepted when verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1WithRSA,
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    Sha384WithRSA,
    Sha512WithRSA,
    Sha1WithECDSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// SHA-512 with ECDSA.
    Sha512WithECDSA,
}

impl SignatureAlgorithm {
    pub fn from_oid(oid: const_oid::ObjectIdentifier) -> Result<Self> {
        use const_oid::db::rfc5912;
        Ok(match oid {
            rfc5912::SHA_1_WITH_RSA_ENCRYPTION => SignatureAlgorithm::Sha1WithRSA,
            rfc5912::SHA_256_WITH_RSA_ENCRYPTION => SignatureAlgorithm::Sha256WithRSA,
            rfc5912::SHA_384_WITH_RSA_ENCRYPTION => SignatureAlgorithm::Sha384WithRSA,
            rfc5912::SHA_512_WITH_RSA_ENCRYPTION => SignatureAlgorithm::Sha512WithRSA,
            ECDSA_WITH_SHA_1 => SignatureAlgorithm::Sha1WithECDSA,
            rfc5912::ECDSA_WITH_SHA_256 => SignatureAlgorithm::Sha256WithECDSA,
            rfc5912::ECDSA_WITH_SHA_384 => SignatureAlgorithm::Sha384WithECDSA,
            rfc5912::ECDSA_WITH_SHA_512 => SignatureAlgorithm::Sha512WithECDSA,
            other => {
                return Err(CertDepotError::UnsupportedAlgorithm(format!(
                    "signature algorithm {other}"
                )));
            }
        })
    }

    pub fn oid(self) -> const_oid::ObjectIdentifier {
        use const_oid::db::rfc5912;
        match self {
            SignatureAlgorithm::Sha1WithRSA => rfc5912::SHA_1_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha256WithRSA => rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha384WithRSA => rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha512WithRSA => rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha1WithECDSA => ECDSA_WITH_SHA_1,
            SignatureAlgorithm::Sha256WithECDSA => rfc5912::ECDSA_WITH_SHA_256,
            SignatureAlgorithm::Sha384WithECDSA => rfc5912::ECDSA_WITH_SHA_384,
            SignatureAlgorithm::Sha512WithECDSA => rfc5912::ECDSA_WITH_SHA_512,
        }
    }

    fn is_rsa(self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::Sha1WithRSA
                | SignatureAlgorithm::Sha256WithRSA
                | SignatureAlgorithm::Sha384WithRSA
                | SignatureAlgorithm::Sha512WithRSA
        )
    }
}

impl TryFrom<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    type Error = CertDepotError;

    /// RSA identifiers carry an explicit NULL parameter, ECDSA ones carry none.
    fn try_from(value: SignatureAlgorithm) -> Result<Self> {
        let parameters = if value.is_rsa() {
            Some(Any::new(Tag::Null, Vec::<u8>::new())?)
        } else {
            None
        };
        Ok(AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters,
        })
    }
}

/// Decodes exactly one DER structure of type `T`, telling a concatenation of
/// several apart from trailing garbage.
pub(crate) fn decode_single<T>(der: &[u8]) -> Result<T>
where
    T: for<'a> Decode<'a>,
{
    let mut reader = SliceReader::new(der)?;
    let value = T::decode(&mut reader)?;
    if reader.is_finished() {
        return Ok(value);
    }
    if T::decode(&mut reader).is_ok() {
        return Err(CertDepotError::MultipleCertificates);
    }
    Err(CertDepotError::ParseError(
        "trailing data after DER structure".to_string(),
    ))
}

/// Splits a PEM input into its DER payload and the verbatim text.
pub(crate) fn pem_input(data: &[u8], label: &str) -> Result<(Vec<u8>, String)> {
    let der = pem_to_der(data, label)?;
    let text = String::from_utf8(data.to_vec())
        .map_err(|e| CertDepotError::FormatError(e.to_string()))?;
    Ok((der, text))
}

pub(crate) fn time_to_offset(time: &x509_cert::time::Time) -> OffsetDateTime {
    match time {
        x509_cert::time::Time::UtcTime(ut) => OffsetDateTime::from(ut.to_system_time()),
        x509_cert::time::Time::GeneralTime(gt) => OffsetDateTime::from(gt.to_system_time()),
    }
}

/// An X.509 certificate held as DER.
///
/// The DER bytes are the source of truth. The parsed structure is built on
/// first use and cached; a certificate loaded from PEM exports the original
/// text unchanged.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    pem: Option<String>,
    parsed: OnceCell<x509_cert::Certificate>,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    pub fn from_der(der: Vec<u8>) -> Self {
        Self {
            der,
            pem: None,
            parsed: OnceCell::new(),
        }
    }

    /// Requires exactly one `CERTIFICATE` block without headers.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let (der, text) = pem_input(data, CERTIFICATE_LABEL)?;
        Ok(Self {
            der,
            pem: Some(text),
            parsed: OnceCell::new(),
        })
    }

    /// The decoded certificate.
    pub fn parsed(&self) -> Result<&x509_cert::Certificate> {
        if let Some(parsed) = self.parsed.get() {
            return Ok(parsed);
        }
        let parsed = decode_single::<x509_cert::Certificate>(&self.der)?;
        Ok(self.parsed.get_or_init(|| parsed))
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// Encodes the certificate into PEM format.
    pub fn export(&self) -> String {
        match &self.pem {
            Some(text) => text.clone(),
            None => der_to_pem(&self.der, CERTIFICATE_LABEL),
        }
    }

    pub fn serial_number(&self) -> Result<BigUint> {
        let serial = &self.parsed()?.tbs_certificate.serial_number;
        Ok(BigUint::from_bytes_be(serial.as_bytes()))
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        Ok(DistinguishedName::from_x509_name(
            &self.parsed()?.tbs_certificate.subject,
        ))
    }

    pub fn subject_common_name(&self) -> Result<Option<String>> {
        Ok(self.subject()?.common_name)
    }

    pub fn validity(&self) -> Result<Validity> {
        let validity = &self.parsed()?.tbs_certificate.validity;
        Ok(Validity {
            not_before: time_to_offset(&validity.not_before),
            not_after: time_to_offset(&validity.not_after),
        })
    }

    /// All extensions in certificate order.
    pub fn extensions(&self) -> Result<Vec<ExtensionParam>> {
        Ok(self
            .parsed()?
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .map(ExtensionParam::from_x509)
            .collect())
    }

    /// Decodes extension `E` if the certificate carries it.
    pub fn extension<E: extensions::ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        match &self.parsed()?.tbs_certificate.extensions {
            Some(extensions) => find_extension(extensions),
            None => Ok(None),
        }
    }

    pub fn subject_key_id(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.extension::<SubjectKeyIdentifier>()?.map(|ski| ski.0))
    }

    /// Time left until NotAfter; negative once the certificate has expired.
    pub fn expiration_duration(&self) -> Result<time::Duration> {
        Ok(self.validity()?.not_after - OffsetDateTime::now_utc())
    }
}

#[cfg(test)]
mod tests {
    use der::Tagged;

    use super::*;
    use crate::key::Key;
    use crate::pki::create_certificate_authority;

    const RSA_KEY_PEM: &str = include_str!("../../tests/fixtures/rsa_key.pem");

    fn authority() -> Certificate {
        let key = Key::from_private_pem(RSA_KEY_PEM.as_bytes()).unwrap();
        create_certificate_authority(&key, 1, "certdepot", "USA")
            .unwrap()
            .0
    }

    #[test]
    fn test_pem_export_is_verbatim() {
        let pem = authority().export();
        // keep a CRLF variant to prove export does not re-encode
        let crlf = pem.replace('\n', "\r\n");
        let cert = Certificate::from_pem(crlf.as_bytes()).unwrap();
        assert_eq!(cert.export(), crlf);
        assert_eq!(Certificate::from_der(cert.to_der().to_vec()).export(), pem);
    }

    #[test]
    fn test_rejects_headers_and_wrong_type() {
        let cert = authority();
        let with_headers = crate::pem_utils::der_to_pem_with_headers(
            cert.to_der(),
            CERTIFICATE_LABEL,
            &[("Comment", "x")],
        );
        assert!(matches!(
            Certificate::from_pem(with_headers.as_bytes()),
            Err(CertDepotError::FormatError(_))
        ));
        let wrong = der_to_pem(cert.to_der(), "CERTIFICATE REQUEST");
        assert!(matches!(
            Certificate::from_pem(wrong.as_bytes()),
            Err(CertDepotError::FormatError(_))
        ));
    }

    #[test]
    fn test_multiple_certificates_in_one_block() {
        let cert = authority();
        let mut der = cert.to_der().to_vec();
        der.extend_from_slice(cert.to_der());
        assert_eq!(
            Certificate::from_der(der).parsed().unwrap_err(),
            CertDepotError::MultipleCertificates
        );
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            Certificate::from_der(vec![0x30, 0x03, 0x01, 0x01, 0xff]).parsed(),
            Err(CertDepotError::ParseError(_))
        ));
        let mut der = authority().to_der().to_vec();
        der.push(0);
        assert!(matches!(
            Certificate::from_der(der).parsed(),
            Err(CertDepotError::ParseError(_))
        ));
    }

    #[test]
    fn test_accessors_read_the_authority() {
        let cert = authority();
        assert_eq!(cert.serial_number().unwrap(), BigUint::from(1u32));
        assert_eq!(cert.subject_common_name().unwrap().as_deref(), Some("CA"));
        let key = Key::from_private_pem(RSA_KEY_PEM.as_bytes()).unwrap();
        assert_eq!(
            cert.subject_key_id().unwrap(),
            Some(key.subject_key_id().unwrap())
        );
        let remaining = cert.expiration_duration().unwrap();
        assert!(remaining > time::Duration::days(360));
        assert!(remaining <= time::Duration::days(366));
    }

    #[test]
    fn test_signature_algorithm_identifiers() {
        let rsa = AlgorithmIdentifierOwned::try_from(SignatureAlgorithm::Sha256WithRSA).unwrap();
        assert_eq!(rsa.parameters.map(|p| p.tag()), Some(Tag::Null));
        let ec = AlgorithmIdentifierOwned::try_from(SignatureAlgorithm::Sha256WithECDSA).unwrap();
        assert!(ec.parameters.is_none());
        assert_eq!(
            SignatureAlgorithm::from_oid(ECDSA_WITH_SHA_1).unwrap(),
            SignatureAlgorithm::Sha1WithECDSA
        );
        assert!(matches!(
            SignatureAlgorithm::from_oid(const_oid::ObjectIdentifier::new_unwrap(
                "1.2.840.10040.4.3"
            )),
            Err(CertDepotError::UnsupportedAlgorithm(_))
        ));
    }
}
