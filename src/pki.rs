//! Creation of the authority certificate, signing requests and host certificates.

use std::net::IpAddr;

use bon::Builder;
use der::asn1::{Any, BitString, OctetString, SetOfVec};
use der::{Decode, Encode};
use rsa::BigUint;
use x509_cert::attr::Attribute;
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq};
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::ca_info::{AUTHORITY_SERIAL_NUMBER, CertificateAuthorityInfo};
use crate::cert::extensions::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
    SubjectKeyIdentifier, ToAndFromX509Extension,
};
use crate::cert::params::{DistinguishedName, ExtensionParam, Validity};
use crate::cert::{Certificate, SignatureAlgorithm};
use crate::csr::CertificateSigningRequest;
use crate::error::{CertDepotError, Result};
use crate::issuer::{CertificateAuthority, IssueRequest, Issuer, SelfIssuer};
use crate::key::{Key, PublicKey};

/// Common name and organizational unit of the authority certificate.
pub const AUTHORITY_NAME: &str = "CA";
pub const DEFAULT_ORGANIZATION: &str = "certdepot";
pub const DEFAULT_COUNTRY: &str = "USA";
pub const DEFAULT_VALIDITY_YEARS: u32 = 10;

/// Identity requested for a host.
///
/// # Fields
/// * `name` - Host name, written as the organizational unit.
/// * `domains` - DNS names; the first one becomes the common name.
/// * `ips` - IP addresses; the first one is the common name when there are no domains.
/// * `organization` - The organization (O).
/// * `country` - The country (C).
#[derive(Clone, Debug, Builder)]
pub struct CsrSubject {
    #[builder(into)]
    pub name: String,
    #[builder(default)]
    pub domains: Vec<String>,
    #[builder(default)]
    pub ips: Vec<String>,
    #[builder(into, default = DEFAULT_ORGANIZATION.to_string())]
    pub organization: String,
    #[builder(into, default = DEFAULT_COUNTRY.to_string())]
    pub country: String,
}

/// Creates the self-signed authority certificate for `key`.
///
/// The certificate may sign host certificates only (key usage keyCertSign,
/// path length 0) and carries serial number 1. The returned bookkeeping
/// starts at serial number 2.
pub fn create_certificate_authority(
    key: &Key,
    years: u32,
    organization: &str,
    country: &str,
) -> Result<(Certificate, CertificateAuthorityInfo)> {
    let subject = DistinguishedName::builder()
        .country(country)
        .organization(organization)
        .organization_unit(AUTHORITY_NAME)
        .common_name(AUTHORITY_NAME)
        .build()
        .to_x509_name()?;

    let key_usage = KeyUsage(KeyUsages::KeyCertSign.into());
    let basic_constraints = BasicConstraints {
        is_ca: true,
        max_path_length: Some(0),
    };
    let subject_key_id = SubjectKeyIdentifier(key.subject_key_id()?);

    let request = IssueRequest::builder()
        .serial_number(BigUint::from(AUTHORITY_SERIAL_NUMBER))
        .subject(subject.clone())
        .subject_public_key_info(key.as_spki()?)
        .validity(Validity::for_years(years)?)
        .extensions(vec![
            ExtensionParam::from_extension(&key_usage, true)?,
            ExtensionParam::from_extension(&basic_constraints, true)?,
            ExtensionParam::from_extension(&subject_key_id, false)?,
        ])
        .build();

    let cert = SelfIssuer::new(subject, key).issue(&request)?;
    tracing::info!(organization, country, years, "created certificate authority");
    Ok((cert, CertificateAuthorityInfo::default()))
}

fn parse_ips(ips: &[String]) -> Result<Vec<IpAddr>> {
    ips.iter()
        .map(|ip| {
            ip.parse::<IpAddr>()
                .map_err(|_| CertDepotError::InvalidSubject(format!("failed to parse ip {ip}")))
        })
        .collect()
}

/// Builds a PKCS#10 request for `subject`, signed with SHA-256 by `key`.
///
/// Domains and IPs are requested as a SubjectAltName through the PKCS#9
/// extensionRequest attribute.
pub fn create_certificate_signing_request(
    key: &Key,
    subject: &CsrSubject,
) -> Result<CertificateSigningRequest> {
    let ips = parse_ips(&subject.ips)?;
    let common_name = subject
        .domains
        .first()
        .cloned()
        .or_else(|| ips.first().map(IpAddr::to_string))
        .ok_or_else(|| {
            CertDepotError::InvalidSubject("no valid domain nor ip provided".to_string())
        })?;

    let name = DistinguishedName::builder()
        .country(subject.country.as_str())
        .organization(subject.organization.as_str())
        .organization_unit(subject.name.as_str())
        .common_name(common_name)
        .build()
        .to_x509_name()?;

    let alt_names = SubjectAltName {
        dns_names: subject.domains.clone(),
        ip_addresses: ips,
    };
    let extension = x509_cert::ext::Extension {
        extn_id: SubjectAltName::OID,
        critical: false,
        extn_value: OctetString::new(alt_names.to_x509_extension_value()?)?,
    };
    let extension_request = Any::from_der(&ExtensionReq(vec![extension]).to_der()?)?;
    let attributes = SetOfVec::try_from(vec![Attribute {
        oid: <ExtensionReq as const_oid::AssociatedOid>::OID,
        values: SetOfVec::try_from(vec![extension_request])?,
    }])?;

    let info = CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: name,
        public_key: key.as_spki()?,
        attributes,
    };
    let signature = key.sign_data(&info.to_der()?)?;
    let request = CertReq {
        info,
        algorithm: AlgorithmIdentifierOwned::try_from(SignatureAlgorithm::Sha256WithRSA)?,
        signature: BitString::from_bytes(&signature)?,
    };

    tracing::debug!(name = %subject.name, "created certificate signing request");
    Ok(CertificateSigningRequest::from_der(request.to_der()?))
}

/// Signs `csr` with the authority, consuming the next serial number from `ca_info`.
///
/// The counter advances even when signing fails afterwards; callers persist
/// `ca_info` and must tolerate the gap.
pub fn create_certificate_host(
    ca_cert: &Certificate,
    ca_info: &mut CertificateAuthorityInfo,
    ca_key: &Key,
    csr: &CertificateSigningRequest,
    years: u32,
    allow_server_auth: bool,
    allow_client_auth: bool,
) -> Result<Certificate> {
    let serial_number = ca_info.next_serial();

    let csr_error = |e: CertDepotError| CertDepotError::CsrParse(e.to_string());
    let request_info = &csr.parsed().map_err(csr_error)?.info;
    let mut alt_names = SubjectAltName {
        dns_names: csr.requested_dns_names().map_err(csr_error)?,
        ip_addresses: csr.requested_ip_addresses().map_err(csr_error)?,
    };

    let subject_key_id = PublicKey::from_x509spki(&request_info.public_key)
        .and_then(|public| public.subject_key_id())
        .map_err(|e| CertDepotError::KeyId(e.to_string()))?;

    // hosts known only by address
    let common_name = DistinguishedName::from_x509_name(&request_info.subject).common_name;
    if let Some(ip) = common_name.and_then(|cn| cn.parse::<IpAddr>().ok()) {
        if !alt_names.ip_addresses.contains(&ip) {
            alt_names.ip_addresses.insert(0, ip);
        }
    }

    let mut extensions = vec![ExtensionParam::from_extension(
        &SubjectKeyIdentifier(subject_key_id),
        false,
    )?];
    if !alt_names.is_empty() {
        extensions.push(ExtensionParam::from_extension(&alt_names, false)?);
    }
    let usage = ExtendedKeyUsage::for_host(allow_server_auth, allow_client_auth);
    if !usage.usage.is_empty() {
        extensions.push(ExtensionParam::from_extension(&usage, false)?);
    }

    let request = IssueRequest::builder()
        .serial_number(serial_number.clone())
        .subject(request_info.subject.clone())
        .subject_public_key_info(request_info.public_key.clone())
        .validity(Validity::for_years(years)?)
        .extensions(extensions)
        .build();

    let cert = CertificateAuthority::new(ca_cert, ca_key)
        .issue(&request)
        .map_err(|e| match e {
            CertDepotError::Signing(_) => e,
            other => CertDepotError::Signing(other.to_string()),
        })?;
    tracing::info!(serial = %serial_number, "issued host certificate");
    Ok(cert)
}
