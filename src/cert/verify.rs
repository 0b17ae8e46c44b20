//! Signature checks and the flat CA→host chain verification.

use std::net::IpAddr;

use const_oid::AssociatedOid;
use der::Encode;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::RsaPublicKey;
use rsa::signature::Verifier;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::spki::AlgorithmIdentifierOwned;

use super::extensions::{BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName};
use super::{Certificate, SignatureAlgorithm};
use crate::error::{CertDepotError, Result};
use crate::key::PublicKey;

fn signature_error(e: impl std::fmt::Display) -> CertDepotError {
    CertDepotError::SignatureError(e.to_string())
}

fn verify_rsa<D>(public: &RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + AssociatedOid,
{
    let key = rsa::pkcs1v15::VerifyingKey::<D>::new(public.clone());
    let signature = rsa::pkcs1v15::Signature::try_from(signature).map_err(signature_error)?;
    key.verify(message, &signature).map_err(signature_error)
}

fn prehash(algorithm: SignatureAlgorithm, message: &[u8]) -> Vec<u8> {
    match algorithm {
        SignatureAlgorithm::Sha1WithECDSA | SignatureAlgorithm::Sha1WithRSA => {
            Sha1::digest(message).to_vec()
        }
        SignatureAlgorithm::Sha256WithECDSA | SignatureAlgorithm::Sha256WithRSA => {
            Sha256::digest(message).to_vec()
        }
        SignatureAlgorithm::Sha384WithECDSA | SignatureAlgorithm::Sha384WithRSA => {
            Sha384::digest(message).to_vec()
        }
        SignatureAlgorithm::Sha512WithECDSA | SignatureAlgorithm::Sha512WithRSA => {
            Sha512::digest(message).to_vec()
        }
    }
}

/// Verifies `signature` over `message` with the algorithm named by `algorithm`.
pub(crate) fn verify_signature(
    public_key: &PublicKey,
    algorithm: &AlgorithmIdentifierOwned,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let algorithm = SignatureAlgorithm::from_oid(algorithm.oid)?;
    match (public_key, algorithm) {
        (PublicKey::Rsa(public), SignatureAlgorithm::Sha1WithRSA) => {
            verify_rsa::<Sha1>(public, message, signature)
        }
        (PublicKey::Rsa(public), SignatureAlgorithm::Sha256WithRSA) => {
            verify_rsa::<Sha256>(public, message, signature)
        }
        (PublicKey::Rsa(public), SignatureAlgorithm::Sha384WithRSA) => {
            verify_rsa::<Sha384>(public, message, signature)
        }
        (PublicKey::Rsa(public), SignatureAlgorithm::Sha512WithRSA) => {
            verify_rsa::<Sha512>(public, message, signature)
        }
        (PublicKey::EcdsaP256(key), alg) if !alg.is_rsa() => {
            let signature = p256::ecdsa::Signature::from_der(signature).map_err(signature_error)?;
            key.verify_prehash(&prehash(alg, message), &signature)
                .map_err(signature_error)
        }
        (PublicKey::EcdsaP384(key), alg) if !alg.is_rsa() => {
            let signature = p384::ecdsa::Signature::from_der(signature).map_err(signature_error)?;
            key.verify_prehash(&prehash(alg, message), &signature)
                .map_err(signature_error)
        }
        (_, alg) => Err(CertDepotError::SignatureError(format!(
            "{alg:?} does not match the public key type"
        ))),
    }
}

/// Matches a DNS name against a SAN or CN pattern. A `*` is only honoured as
/// the whole left-most label and matches exactly one label.
fn matches_dns_pattern(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if pattern.is_empty() || host.is_empty() {
        return false;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix),
        None => pattern == host,
    }
}

/// Whether a certificate with these names is valid for `name`.
///
/// IP literals are matched against IP SANs only. DNS names are matched
/// against the DNS SANs, or against the common name when there are none.
pub fn matches_host_name(san: &SubjectAltName, common_name: Option<&str>, name: &str) -> bool {
    let literal = name.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return san.ip_addresses.contains(&ip);
    }
    if san.dns_names.is_empty() {
        return common_name.is_some_and(|cn| matches_dns_pattern(cn, name));
    }
    san.dns_names
        .iter()
        .any(|pattern| matches_dns_pattern(pattern, name))
}

impl Certificate {
    /// Verifies this certificate's signature with `issuer`'s public key.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> Result<()> {
        let cert = self.parsed()?;
        let issuer_key =
            PublicKey::from_x509spki(&issuer.parsed()?.tbs_certificate.subject_public_key_info)?;
        if cert.signature_algorithm.oid != cert.tbs_certificate.signature.oid {
            return Err(CertDepotError::SignatureError(
                "signature algorithm differs from the one in the signed data".to_string(),
            ));
        }
        let tbs = cert.tbs_certificate.to_der()?;
        verify_signature(
            &issuer_key,
            &cert.signature_algorithm,
            &tbs,
            cert.signature.raw_bytes(),
        )
    }

    /// Checks that the certificate is a self-signed authority.
    ///
    /// This says nothing about whether the authority should be trusted.
    pub fn check_self_authority(&self) -> Result<()> {
        let cert = self.parsed()?;
        self.verify_signed_by(self)?;
        if cert.tbs_certificate.version != Version::V3 {
            return Err(CertDepotError::SignatureError(
                "authority certificate is not X.509 v3".to_string(),
            ));
        }
        let is_ca = self
            .extension::<BasicConstraints>()?
            .is_some_and(|bc| bc.is_ca);
        if !is_ca {
            return Err(CertDepotError::SignatureError(
                "certificate is not allowed to sign other certificates".to_string(),
            ));
        }
        if let Some(key_usage) = self.extension::<KeyUsage>()? {
            if !key_usage.0.contains(KeyUsages::KeyCertSign) {
                return Err(CertDepotError::SignatureError(
                    "key usage does not permit certificate signing".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Verifies `host` for `name` with this certificate as the only trust root.
    ///
    /// The host is either the root itself or signed directly by it; no
    /// intermediates are considered.
    pub fn verify_host(&self, host: &Certificate, name: &str) -> Result<()> {
        self.verify_host_at(host, name, OffsetDateTime::now_utc())
    }

    fn verify_host_at(
        &self,
        host: &Certificate,
        name: &str,
        now: OffsetDateTime,
    ) -> Result<()> {
        let chain_error = |e: CertDepotError| CertDepotError::ChainError(e.to_string());
        self.check_self_authority().map_err(chain_error)?;

        let chains = self.chains_for(host)?;
        let chain = match chains.as_slice() {
            [chain] => chain,
            [] => {
                return Err(CertDepotError::ChainError(
                    "certificate signed by unknown authority".to_string(),
                ));
            }
            more => {
                return Err(CertDepotError::ChainError(format!(
                    "expected one chain, found {}",
                    more.len()
                )));
            }
        };

        for cert in chain {
            if !cert.validity()?.contains(now) {
                return Err(CertDepotError::ChainError(
                    "certificate has expired or is not yet valid".to_string(),
                ));
            }
        }

        let san = host.extension::<SubjectAltName>()?.unwrap_or_default();
        let common_name = host.subject_common_name()?;
        if !matches_host_name(&san, common_name.as_deref(), name) {
            return Err(CertDepotError::ChainError(format!(
                "certificate is not valid for {name}"
            )));
        }

        if let Some(eku) = host.extension::<ExtendedKeyUsage>()? {
            if !eku.permits_server_auth() {
                return Err(CertDepotError::ChainError(
                    "certificate does not permit server authentication".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Every path from `host` to this root, leaf first.
    fn chains_for<'a>(&'a self, host: &'a Certificate) -> Result<Vec<Vec<&'a Certificate>>> {
        if host.to_der() == self.to_der() {
            return Ok(vec![vec![self]]);
        }
        let issued_by_root =
            host.parsed()?.tbs_certificate.issuer == self.parsed()?.tbs_certificate.subject;
        if issued_by_root && host.verify_signed_by(self).is_ok() {
            return Ok(vec![vec![host, self]]);
        }
        Ok(Vec::new())
    }
}
