//! PKCS#10 certificate signing requests.

use std::cell::OnceCell;
use std::net::IpAddr;

use const_oid::AssociatedOid;
use der::{Decode, Encode};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, ExtensionReq};

use crate::cert::extensions::{SubjectAltName, find_extension};
use crate::cert::params::DistinguishedName;
use crate::cert::verify::verify_signature;
use crate::cert::{decode_single, pem_input};
use crate::error::{CertDepotError, Result};
use crate::key::PublicKey;
use crate::pem_utils::{CERTIFICATE_REQUEST_LABEL, der_to_pem};

/// A certificate signing request held as DER, parsed on first use.
#[derive(Debug, Clone)]
pub struct CertificateSigningRequest {
    der: Vec<u8>,
    pem: Option<String>,
    parsed: OnceCell<CertReq>,
}

impl CertificateSigningRequest {
    pub fn from_der(der: Vec<u8>) -> Self {
        Self {
            der,
            pem: None,
            parsed: OnceCell::new(),
        }
    }

    /// Requires exactly one `CERTIFICATE REQUEST` block without headers.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let (der, text) = pem_input(data, CERTIFICATE_REQUEST_LABEL)?;
        Ok(Self {
            der,
            pem: Some(text),
            parsed: OnceCell::new(),
        })
    }

    pub fn parsed(&self) -> Result<&CertReq> {
        if let Some(parsed) = self.parsed.get() {
            return Ok(parsed);
        }
        let parsed = decode_single::<CertReq>(&self.der).map_err(|e| match e {
            CertDepotError::MultipleCertificates => {
                CertDepotError::ParseError("more than one request in a block".to_string())
            }
            other => other,
        })?;
        Ok(self.parsed.get_or_init(|| parsed))
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// PEM text; the original input when loaded from PEM.
    pub fn export(&self) -> String {
        match &self.pem {
            Some(text) => text.clone(),
            None => der_to_pem(&self.der, CERTIFICATE_REQUEST_LABEL),
        }
    }

    /// The requested subject name, as encoded by the requester.
    pub fn subject(&self) -> Result<&Name> {
        Ok(&self.parsed()?.info.subject)
    }

    pub fn distinguished_name(&self) -> Result<DistinguishedName> {
        Ok(DistinguishedName::from_x509_name(self.subject()?))
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.parsed()?.info.public_key)
    }

    /// Checks the proof of possession: the request is signed by the key it carries.
    pub fn check_signature(&self) -> Result<()> {
        let request = self.parsed()?;
        let info = request.info.to_der()?;
        verify_signature(
            &self.public_key()?,
            &request.algorithm,
            &info,
            request.signature.raw_bytes(),
        )
    }

    /// Extensions asked for through the PKCS#9 extensionRequest attribute.
    pub fn requested_extensions(&self) -> Result<Vec<Extension>> {
        let mut extensions = Vec::new();
        for attribute in self.parsed()?.info.attributes.iter() {
            if attribute.oid != ExtensionReq::OID {
                continue;
            }
            for value in attribute.values.iter() {
                let request = ExtensionReq::from_der(&value.to_der()?)?;
                extensions.extend(request.0);
            }
        }
        Ok(extensions)
    }

    fn requested_alt_names(&self) -> Result<SubjectAltName> {
        Ok(find_extension::<SubjectAltName>(&self.requested_extensions()?)?.unwrap_or_default())
    }

    pub fn requested_dns_names(&self) -> Result<Vec<String>> {
        Ok(self.requested_alt_names()?.dns_names)
    }

    pub fn requested_ip_addresses(&self) -> Result<Vec<IpAddr>> {
        Ok(self.requested_alt_names()?.ip_addresses)
    }
}
