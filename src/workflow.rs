//! End-to-end lifecycle steps over a depot: init, new host, sign, status, chain.
//!
//! Each function loads what it needs from the depot, runs the PKIX engine and
//! stores the results. Nothing is printed; callers render the returned values.

use std::fmt;

use bon::Builder;
use zeroize::Zeroizing;

use crate::cert::Certificate;
use crate::csr::CertificateSigningRequest;
use crate::depot::Depot;
use crate::depot::pkix;
use crate::error::{CertDepotError, Result};
use crate::key::{DEFAULT_RSA_BITS, Key};
use crate::pki::{
    CsrSubject, DEFAULT_COUNTRY, DEFAULT_ORGANIZATION, DEFAULT_VALIDITY_YEARS,
    create_certificate_authority, create_certificate_host, create_certificate_signing_request,
};

/// Key size of a new authority.
pub const AUTHORITY_RSA_BITS: usize = 4096;
/// Certificates closer to expiry than this are flagged.
pub const EXPIRY_WARNING_DAYS: i64 = 60;

/// Parameters of [`init_authority`]. An empty passphrase stores the key unencrypted.
#[derive(Clone, Builder)]
pub struct InitOptions {
    #[builder(default = AUTHORITY_RSA_BITS)]
    pub key_bits: usize,
    #[builder(default = DEFAULT_VALIDITY_YEARS)]
    pub years: u32,
    #[builder(into, default = DEFAULT_ORGANIZATION.to_string())]
    pub organization: String,
    #[builder(into, default = DEFAULT_COUNTRY.to_string())]
    pub country: String,
    #[builder(into, default)]
    pub passphrase: Zeroizing<Vec<u8>>,
}

/// Parameters of [`create_host`].
///
/// Without domains or IPs the host name itself is the only requested domain.
#[derive(Clone, Builder)]
pub struct HostOptions {
    #[builder(into)]
    pub name: String,
    #[builder(default)]
    pub domains: Vec<String>,
    #[builder(default)]
    pub ips: Vec<String>,
    #[builder(default = DEFAULT_RSA_BITS)]
    pub key_bits: usize,
    #[builder(into, default = DEFAULT_ORGANIZATION.to_string())]
    pub organization: String,
    #[builder(into, default = DEFAULT_COUNTRY.to_string())]
    pub country: String,
    #[builder(into, default)]
    pub passphrase: Zeroizing<Vec<u8>>,
}

/// Parameters of [`sign_host`]. `passphrase` unlocks the authority key.
#[derive(Clone, Builder)]
pub struct SignOptions {
    #[builder(into)]
    pub name: String,
    #[builder(default = DEFAULT_VALIDITY_YEARS)]
    pub years: u32,
    #[builder(default = true)]
    pub allow_server_auth: bool,
    #[builder(default = true)]
    pub allow_client_auth: bool,
    #[builder(into, default)]
    pub passphrase: Zeroizing<Vec<u8>>,
}

/// Creates the authority key and certificate and stores them with a fresh serial counter.
///
/// Refuses when any authority artifact is already stored.
pub fn init_authority(depot: &dyn Depot, options: &InitOptions) -> Result<Certificate> {
    if pkix::check_certificate_authority(depot)
        || pkix::check_certificate_authority_info(depot)
        || pkix::check_private_key_authority(depot)
    {
        return Err(CertDepotError::StateError(
            "certificate authority already exists".to_string(),
        ));
    }

    let key = Key::generate(options.key_bits)?;
    let (crt, info) = create_certificate_authority(
        &key,
        options.years,
        &options.organization,
        &options.country,
    )?;

    pkix::put_certificate_authority(depot, &crt)?;
    pkix::put_certificate_authority_info(depot, &info)?;
    pkix::put_encrypted_private_key_authority(depot, &key, &options.passphrase)?;
    tracing::info!(
        encrypted = !options.passphrase.is_empty(),
        "stored certificate authority"
    );
    Ok(crt)
}

/// Generates a host key and signing request and stores both.
///
/// Refuses when the host's key or request is already stored.
pub fn create_host(depot: &dyn Depot, options: &HostOptions) -> Result<CertificateSigningRequest> {
    let name = options.name.as_str();
    if name.is_empty() {
        return Err(CertDepotError::InvalidSubject("empty host name".to_string()));
    }
    if pkix::check_private_key_host(depot, name)
        || pkix::check_certificate_signing_request(depot, name)
    {
        return Err(CertDepotError::StateError(format!(
            "key or certificate request for {name} already exists"
        )));
    }

    let domains = if options.domains.is_empty() && options.ips.is_empty() {
        vec![name.to_string()]
    } else {
        options.domains.clone()
    };
    let subject = CsrSubject::builder()
        .name(name)
        .domains(domains)
        .ips(options.ips.clone())
        .organization(options.organization.as_str())
        .country(options.country.as_str())
        .build();

    let key = Key::generate(options.key_bits)?;
    let csr = create_certificate_signing_request(&key, &subject)?;

    pkix::put_encrypted_private_key_host(depot, name, &key, &options.passphrase)?;
    pkix::put_certificate_signing_request(depot, name, &csr)?;
    tracing::info!(name, "stored host key and certificate request");
    Ok(csr)
}

/// Signs the stored request of a host with the authority and stores the certificate.
///
/// The advanced serial counter is stored before the certificate, so a failed
/// certificate write leaves a gap rather than a reused serial.
pub fn sign_host(depot: &dyn Depot, options: &SignOptions) -> Result<Certificate> {
    let name = options.name.as_str();
    if pkix::check_certificate_host(depot, name) {
        return Err(CertDepotError::StateError(format!(
            "certificate for {name} already exists"
        )));
    }
    if !pkix::check_certificate_signing_request(depot, name) {
        return Err(CertDepotError::StateError(format!(
            "no certificate request for {name}"
        )));
    }
    if !pkix::check_certificate_authority(depot) {
        return Err(CertDepotError::StateError(
            "no certificate authority".to_string(),
        ));
    }

    let csr = pkix::get_certificate_signing_request(depot, name)?;
    csr.check_signature()?;

    let ca_crt = pkix::get_certificate_authority(depot)?;
    let mut ca_info = pkix::get_certificate_authority_info(depot)?;
    let ca_key = pkix::get_encrypted_private_key_authority(depot, &options.passphrase)?;

    let crt = create_certificate_host(
        &ca_crt,
        &mut ca_info,
        &ca_key,
        &csr,
        options.years,
        options.allow_server_auth,
        options.allow_client_auth,
    )?;

    pkix::update_certificate_authority_info(depot, &ca_info)?;
    if let Err(err) = pkix::put_certificate_host(depot, name, &crt) {
        tracing::warn!(name, error = %err, "serial number consumed without a stored certificate");
        return Err(err);
    }
    tracing::info!(name, "stored host certificate");
    Ok(crt)
}

/// Signing state of one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateState {
    Unsigned,
    /// Signed; `remaining` is negative once expired.
    Signed { remaining: time::Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub name: String,
    pub state: CertificateState,
}

impl Status {
    fn signed(name: &str, crt: &Certificate) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            state: CertificateState::Signed {
                remaining: crt.expiration_duration()?,
            },
        })
    }

    pub fn is_expiring(&self) -> bool {
        matches!(
            self.state,
            CertificateState::Signed { remaining }
                if remaining < time::Duration::days(EXPIRY_WARNING_DAYS)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            CertificateState::Unsigned => write!(f, "{}: Unsigned", self.name),
            CertificateState::Signed { remaining } => {
                let days = remaining.as_seconds_f64() / 86_400.0;
                let level = if self.is_expiring() { "WARN" } else { "OK" };
                write!(f, "{}: {level} ({days:.2} days until expiration)", self.name)
            }
        }
    }
}

/// The authority (absent before init) and every host with a stored request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotStatus {
    pub authority: Option<Status>,
    pub hosts: Vec<Status>,
}

pub fn status(depot: &dyn Depot) -> Result<DepotStatus> {
    let authority = match pkix::get_certificate_authority(depot) {
        Ok(crt) => Some(Status::signed("CA", &crt)?),
        Err(CertDepotError::NotFound(_)) => None,
        Err(err) => return Err(err),
    };

    let mut hosts = Vec::new();
    for tag in depot.list()? {
        let Some(name) = pkix::host_name_from_csr_tag(&tag) else {
            continue;
        };
        let status = match pkix::get_certificate_host(depot, &name) {
            Ok(crt) => Status::signed(&name, &crt)?,
            Err(err) => {
                tracing::debug!(name = %name, error = %err, "host certificate unavailable");
                Status {
                    name,
                    state: CertificateState::Unsigned,
                }
            }
        };
        hosts.push(status);
    }
    Ok(DepotStatus { authority, hosts })
}

/// PEM of the authority, followed by the host's certificate when `name` is given.
///
/// The host certificate must verify against the authority for `name`.
pub fn chain(depot: &dyn Depot, name: Option<&str>) -> Result<String> {
    let ca_crt = pkix::get_certificate_authority(depot)?;
    let Some(name) = name else {
        return Ok(ca_crt.export());
    };
    let host_crt = pkix::get_certificate_host(depot, name)?;
    ca_crt.verify_host(&host_crt, name)?;
    Ok(format!("{}{}", ca_crt.export(), host_crt.export()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depot::kv::{KvDepot, MemoryStore};
    use crate::depot::Depot;

    const TEST_BITS: usize = 1024;

    fn init(depot: &dyn Depot) -> Certificate {
        init_authority(depot, &InitOptions::builder().key_bits(TEST_BITS).build()).unwrap()
    }

    #[test]
    fn test_option_defaults() {
        let init = InitOptions::builder().build();
        assert_eq!(init.key_bits, AUTHORITY_RSA_BITS);
        assert_eq!(init.years, 10);
        assert_eq!(init.organization, "certdepot");
        assert_eq!(init.country, "USA");
        assert!(init.passphrase.is_empty());

        let host = HostOptions::builder().name("web").build();
        assert_eq!(host.key_bits, DEFAULT_RSA_BITS);

        let sign = SignOptions::builder().name("web").passphrase(b"pw".to_vec()).build();
        assert!(sign.allow_server_auth && sign.allow_client_auth);
        assert_eq!(sign.passphrase.as_slice(), b"pw");
    }

    #[test]
    fn test_init_refuses_partial_authority() {
        let depot = KvDepot::new(MemoryStore::new());
        depot.put(&pkix::authority_info_tag(), b"2").unwrap();
        assert!(matches!(
            init_authority(&depot, &InitOptions::builder().key_bits(TEST_BITS).build()),
            Err(CertDepotError::StateError(_))
        ));
        assert!(!pkix::check_certificate_authority(&depot));
    }

    #[test]
    fn test_host_defaults_to_its_own_name() {
        let depot = KvDepot::new(MemoryStore::new());
        let csr = create_host(
            &depot,
            &HostOptions::builder().name("node1").key_bits(TEST_BITS).build(),
        )
        .unwrap();
        assert_eq!(csr.requested_dns_names().unwrap(), vec!["node1".to_string()]);
        assert!(pkix::check_private_key_host(&depot, "node1"));
        assert!(matches!(
            create_host(
                &depot,
                &HostOptions::builder().name("node1").key_bits(TEST_BITS).build()
            ),
            Err(CertDepotError::StateError(_))
        ));
    }

    #[test]
    fn test_sign_requires_request_and_authority() {
        let depot = KvDepot::new(MemoryStore::new());
        let options = SignOptions::builder().name("ghost").build();
        assert!(matches!(
            sign_host(&depot, &options),
            Err(CertDepotError::StateError(_))
        ));

        create_host(
            &depot,
            &HostOptions::builder().name("ghost").key_bits(TEST_BITS).build(),
        )
        .unwrap();
        assert!(matches!(
            sign_host(&depot, &options),
            Err(CertDepotError::StateError(_))
        ));
    }

    #[test]
    fn test_sign_rejects_forged_request() {
        let depot = KvDepot::new(MemoryStore::new());
        init(&depot);
        let good = create_host(
            &depot,
            &HostOptions::builder().name("real").key_bits(TEST_BITS).build(),
        )
        .unwrap();
        let mut der = good.to_der().to_vec();
        let last = der.len() - 1;
        der[last] ^= 0x01;
        let forged = CertificateSigningRequest::from_der(der);
        pkix::put_certificate_signing_request(&depot, "forged", &forged).unwrap();

        assert!(matches!(
            sign_host(&depot, &SignOptions::builder().name("forged").build()),
            Err(CertDepotError::SignatureError(_))
        ));
        let info = pkix::get_certificate_authority_info(&depot).unwrap();
        assert_eq!(info.to_json(), b"2");
    }

    #[test]
    fn test_status_lists_requested_hosts() {
        let depot = KvDepot::new(MemoryStore::new());
        assert_eq!(
            status(&depot).unwrap(),
            DepotStatus {
                authority: None,
                hosts: Vec::new()
            }
        );

        init(&depot);
        for name in ["alpha", "beta"] {
            create_host(
                &depot,
                &HostOptions::builder().name(name).key_bits(TEST_BITS).build(),
            )
            .unwrap();
        }
        sign_host(&depot, &SignOptions::builder().name("beta").years(1).build()).unwrap();

        let report = status(&depot).unwrap();
        let authority = report.authority.unwrap();
        assert!(!authority.is_expiring());
        assert!(authority.to_string().starts_with("CA: OK ("));

        assert_eq!(report.hosts.len(), 2);
        assert_eq!(report.hosts[0].name, "alpha");
        assert_eq!(report.hosts[0].state, CertificateState::Unsigned);
        assert_eq!(report.hosts[0].to_string(), "alpha: Unsigned");
        assert_eq!(report.hosts[1].name, "beta");
        assert!(matches!(
            report.hosts[1].state,
            CertificateState::Signed { remaining } if remaining > time::Duration::days(360)
        ));
    }

    #[test]
    fn test_expiring_threshold() {
        let soon = Status {
            name: "h".to_string(),
            state: CertificateState::Signed {
                remaining: time::Duration::days(59),
            },
        };
        assert!(soon.is_expiring());
        assert_eq!(soon.to_string(), "h: WARN (59.00 days until expiration)");
        let later = Status {
            name: "h".to_string(),
            state: CertificateState::Signed {
                remaining: time::Duration::days(60),
            },
        };
        assert!(!later.is_expiring());
        let unsigned = Status {
            name: "h".to_string(),
            state: CertificateState::Unsigned,
        };
        assert!(!unsigned.is_expiring());
    }

    #[test]
    fn test_chain_without_host() {
        let depot = KvDepot::new(MemoryStore::new());
        assert!(matches!(chain(&depot, None), Err(CertDepotError::NotFound(_))));
        let ca = init(&depot);
        assert_eq!(chain(&depot, None).unwrap(), ca.export());
        assert!(matches!(
            chain(&depot, Some("missing")),
            Err(CertDepotError::NotFound(_))
        ));
    }
}
