mod util;

use certdepot::ca_info::CertificateAuthorityInfo;
use certdepot::cert::Certificate;
use certdepot::cert::extensions::{ExtendedKeyUsage, SubjectAltName};
use certdepot::csr::CertificateSigningRequest;
use certdepot::depot::pkix;
use certdepot::error::CertDepotError;
use certdepot::key::Key;
use certdepot::pki::{
    CsrSubject, create_certificate_authority, create_certificate_host,
    create_certificate_signing_request,
};
use certdepot::workflow::{self, CertificateState, HostOptions, InitOptions, SignOptions};
use rsa::BigUint;

type Result<T> = std::result::Result<T, CertDepotError>;

const PASSPHRASE: &[u8] = b"correct horse";

fn init_options() -> InitOptions {
    InitOptions::builder()
        .key_bits(util::TEST_KEY_BITS)
        .passphrase(PASSPHRASE.to_vec())
        .build()
}

fn host_options(name: &str) -> HostOptions {
    HostOptions::builder()
        .name(name)
        .key_bits(util::TEST_KEY_BITS)
        .build()
}

fn sign_options(name: &str) -> SignOptions {
    SignOptions::builder()
        .name(name)
        .passphrase(PASSPHRASE.to_vec())
        .build()
}

/// init, new host, sign and chain against a file depot.
#[test]
fn full_lifecycle() -> Result<()> {
    let (_dir, depot) = util::file_depot();

    let ca = workflow::init_authority(&depot, &init_options())?;
    ca.verify_signed_by(&ca)?;
    ca.check_self_authority()?;
    assert_eq!(pkix::get_certificate_authority(&depot)?, ca);
    assert_eq!(pkix::get_certificate_authority_info(&depot)?.to_json(), b"2");

    let stored_key = String::from_utf8(depot_bytes(&depot, "ca.key")).unwrap();
    assert!(stored_key.contains("Proc-Type: 4,ENCRYPTED"));
    assert!(matches!(
        pkix::get_private_key_authority(&depot),
        Err(CertDepotError::FormatError(_))
    ));

    workflow::create_host(&depot, &host_options("host1"))?;
    let host = workflow::sign_host(&depot, &sign_options("host1"))?;
    assert_eq!(host.serial_number()?, BigUint::from(2u32));
    assert_eq!(pkix::get_certificate_authority_info(&depot)?.to_json(), b"3");
    assert_eq!(
        host.extension::<ExtendedKeyUsage>()?,
        Some(ExtendedKeyUsage::for_host(true, true))
    );

    ca.verify_host(&host, "host1")?;
    let chain = workflow::chain(&depot, Some("host1"))?;
    assert_eq!(chain.matches("-----BEGIN CERTIFICATE-----").count(), 2);
    assert!(chain.starts_with(&ca.export()));
    assert_eq!(
        workflow::chain(&depot, None)?.matches("CERTIFICATE").count(),
        2
    );

    assert!(matches!(
        workflow::sign_host(&depot, &sign_options("host1")),
        Err(CertDepotError::StateError(_))
    ));

    let report = workflow::status(&depot)?;
    assert!(report.authority.is_some());
    assert_eq!(report.hosts.len(), 1);
    assert!(matches!(
        report.hosts[0].state,
        CertificateState::Signed { .. }
    ));
    Ok(())
}

fn depot_bytes(depot: &certdepot::depot::file::FileDepot, name: &str) -> Vec<u8> {
    std::fs::read(depot.dir().join(name)).unwrap()
}

#[test]
fn serial_numbers_increase_across_signings() -> Result<()> {
    let (_dir, depot) = util::file_depot();
    workflow::init_authority(&depot, &init_options())?;

    let mut serials = Vec::new();
    for name in ["a", "b", "c"] {
        workflow::create_host(&depot, &host_options(name))?;
        serials.push(workflow::sign_host(&depot, &sign_options(name))?.serial_number()?);
    }
    assert_eq!(
        serials,
        vec![BigUint::from(2u32), BigUint::from(3u32), BigUint::from(4u32)]
    );
    assert_eq!(pkix::get_certificate_authority_info(&depot)?.to_json(), b"5");
    Ok(())
}

/// Two signers that load the counter before either stores it hand out the
/// same serial. Storage does not serialize them.
#[test]
fn concurrent_signers_can_reuse_a_serial() -> Result<()> {
    util::init_tracing();
    let key = util::fixture_key();
    let (ca, info) = create_certificate_authority(&key, 1, "certdepot", "USA")?;
    let stored = info.to_json();

    let csr = CertificateSigningRequest::from_pem(util::HOST_CSR_PEM.as_bytes())?;
    let mut first = CertificateAuthorityInfo::from_json(&stored)?;
    let mut second = CertificateAuthorityInfo::from_json(&stored)?;
    let a = create_certificate_host(&ca, &mut first, &key, &csr, 1, true, true)?;
    let b = create_certificate_host(&ca, &mut second, &key, &csr, 1, true, true)?;
    assert_eq!(a.serial_number()?, b.serial_number()?);
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn chain_rejects_other_names_and_foreign_authorities() -> Result<()> {
    util::init_tracing();
    let ca_key = util::fixture_key();
    let (ca, mut info) = create_certificate_authority(&ca_key, 1, "certdepot", "USA")?;

    let host_key = Key::generate(util::TEST_KEY_BITS)?;
    let subject = CsrSubject::builder()
        .name("web")
        .domains(vec!["web.example.com".to_string()])
        .ips(vec!["10.0.0.7".to_string()])
        .build();
    let csr = create_certificate_signing_request(&host_key, &subject)?;
    let host = create_certificate_host(&ca, &mut info, &ca_key, &csr, 1, true, false)?;

    ca.verify_host(&host, "web.example.com")?;
    ca.verify_host(&host, "10.0.0.7")?;
    for wrong in ["other.example.com", "example.com", "10.0.0.8"] {
        assert!(matches!(
            ca.verify_host(&host, wrong),
            Err(CertDepotError::ChainError(_))
        ));
    }

    let other_key = Key::generate(util::TEST_KEY_BITS)?;
    let (other_ca, _) = create_certificate_authority(&other_key, 1, "certdepot", "USA")?;
    assert!(matches!(
        other_ca.verify_host(&host, "web.example.com"),
        Err(CertDepotError::ChainError(_))
    ));

    let client_only = create_certificate_host(&ca, &mut info, &ca_key, &csr, 1, false, true)?;
    assert!(matches!(
        ca.verify_host(&client_only, "web.example.com"),
        Err(CertDepotError::ChainError(_))
    ));
    Ok(())
}

#[test]
fn pem_round_trips() -> Result<()> {
    let key = util::fixture_key();
    assert_eq!(key.export_private_pem()?, util::RSA_KEY_PEM);

    let (ca, _) = create_certificate_authority(&key, 1, "certdepot", "USA")?;
    let reloaded = Certificate::from_pem(ca.export().as_bytes())?;
    assert_eq!(reloaded, ca);
    assert_eq!(reloaded.export(), ca.export());

    let csr = CertificateSigningRequest::from_pem(util::HOST_CSR_PEM.as_bytes())?;
    assert_eq!(csr.export(), util::HOST_CSR_PEM);

    let doubled = format!("{}{}", ca.export(), ca.export());
    assert!(Certificate::from_pem(doubled.as_bytes()).is_err());
    Ok(())
}

#[test]
fn encrypted_keys() -> Result<()> {
    let key = Key::from_encrypted_private_pem(
        util::RSA_KEY_DES3_PEM.as_bytes(),
        util::RSA_KEY_DES3_PASSPHRASE,
    )?;
    assert!(key.has_private());
    assert!(matches!(
        Key::from_encrypted_private_pem(util::RSA_KEY_DES3_PEM.as_bytes(), b"654321"),
        Err(CertDepotError::DecryptionError(_))
    ));

    let exported = key.export_encrypted_private_pem(b"another")?;
    assert!(exported.contains("DEK-Info: AES-256-CBC,"));
    let again = Key::from_encrypted_private_pem(exported.as_bytes(), b"another")?;
    assert_eq!(again.public_key(), key.public_key());
    assert_eq!(again.export_private_pem()?, key.export_private_pem()?);
    Ok(())
}

#[test]
fn host_certificate_carries_request_names() -> Result<()> {
    let (_dir, depot) = util::file_depot();
    workflow::init_authority(&depot, &init_options())?;
    workflow::create_host(
        &depot,
        &HostOptions::builder()
            .name("db")
            .domains(vec!["db.internal".to_string()])
            .ips(vec!["192.168.1.20".to_string()])
            .key_bits(util::TEST_KEY_BITS)
            .build(),
    )?;
    let host = workflow::sign_host(&depot, &sign_options("db"))?;
    let san = host.extension::<SubjectAltName>()?.unwrap_or_default();
    assert_eq!(san.dns_names, vec!["db.internal".to_string()]);
    assert_eq!(
        san.ip_addresses,
        vec!["192.168.1.20".parse::<std::net::IpAddr>().unwrap()]
    );
    assert_eq!(host.subject_common_name()?.as_deref(), Some("db.internal"));

    // the chain check is by requested name, not by host name
    assert!(workflow::chain(&depot, Some("db")).is_err());
    Ok(())
}
