//! The artifact catalog and typed accessors for PKIX objects.

use super::{BRANCH_PERM, Depot, LEAF_PERM, ROOT_PERM, Tag};
use crate::ca_info::CertificateAuthorityInfo;
use crate::cert::Certificate;
use crate::csr::CertificateSigningRequest;
use crate::error::Result;
use crate::key::Key;

const AUTHORITY_PREFIX: &str = "ca";
const HOST_PADDING: &str = ".host";
const CRT_SUFFIX: &str = ".crt";
const CRT_INFO_SUFFIX: &str = ".crt.info";
const CSR_SUFFIX: &str = ".csr";
const PRIVATE_KEY_SUFFIX: &str = ".key";

pub fn authority_crt_tag() -> Tag {
    Tag::new(format!("{AUTHORITY_PREFIX}{CRT_SUFFIX}"), LEAF_PERM)
}

pub fn authority_key_tag() -> Tag {
    Tag::new(format!("{AUTHORITY_PREFIX}{PRIVATE_KEY_SUFFIX}"), ROOT_PERM)
}

pub fn authority_info_tag() -> Tag {
    Tag::new(format!("{AUTHORITY_PREFIX}{CRT_INFO_SUFFIX}"), ROOT_PERM)
}

pub fn host_crt_tag(name: &str) -> Tag {
    Tag::new(format!("{name}{HOST_PADDING}{CRT_SUFFIX}"), LEAF_PERM)
}

pub fn host_csr_tag(name: &str) -> Tag {
    Tag::new(format!("{name}{HOST_PADDING}{CSR_SUFFIX}"), LEAF_PERM)
}

pub fn host_key_tag(name: &str) -> Tag {
    Tag::new(format!("{name}{HOST_PADDING}{PRIVATE_KEY_SUFFIX}"), BRANCH_PERM)
}

fn host_name_with_suffix(tag: &Tag, suffix: &str) -> Option<String> {
    tag.name()
        .strip_suffix(suffix)
        .and_then(|rest| rest.strip_suffix(HOST_PADDING))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// The host a `<name>.host.crt` tag belongs to.
pub fn host_name_from_crt_tag(tag: &Tag) -> Option<String> {
    host_name_with_suffix(tag, CRT_SUFFIX)
}

/// The host a `<name>.host.csr` tag belongs to.
pub fn host_name_from_csr_tag(tag: &Tag) -> Option<String> {
    host_name_with_suffix(tag, CSR_SUFFIX)
}

pub fn put_certificate_authority(depot: &dyn Depot, crt: &Certificate) -> Result<()> {
    depot.put(&authority_crt_tag(), crt.export().as_bytes())
}

pub fn check_certificate_authority(depot: &dyn Depot) -> bool {
    depot.check(&authority_crt_tag())
}

pub fn get_certificate_authority(depot: &dyn Depot) -> Result<Certificate> {
    Certificate::from_pem(&depot.get(&authority_crt_tag())?)
}

pub fn delete_certificate_authority(depot: &dyn Depot) -> Result<()> {
    depot.delete(&authority_crt_tag())
}

pub fn put_certificate_authority_info(
    depot: &dyn Depot,
    info: &CertificateAuthorityInfo,
) -> Result<()> {
    depot.put(&authority_info_tag(), &info.to_json())
}

pub fn check_certificate_authority_info(depot: &dyn Depot) -> bool {
    depot.check(&authority_info_tag())
}

pub fn get_certificate_authority_info(depot: &dyn Depot) -> Result<CertificateAuthorityInfo> {
    CertificateAuthorityInfo::from_json(&depot.get(&authority_info_tag())?)
}

pub fn delete_certificate_authority_info(depot: &dyn Depot) -> Result<()> {
    depot.delete(&authority_info_tag())
}

/// Replaces the stored info: a best-effort delete followed by a put.
///
/// Not atomic. A failure between the two steps leaves no info stored.
pub fn update_certificate_authority_info(
    depot: &dyn Depot,
    info: &CertificateAuthorityInfo,
) -> Result<()> {
    if let Err(err) = delete_certificate_authority_info(depot) {
        tracing::debug!(error = %err, "no previous authority info to replace");
    }
    put_certificate_authority_info(depot, info)
}

pub fn put_private_key_authority(depot: &dyn Depot, key: &Key) -> Result<()> {
    depot.put(&authority_key_tag(), key.export_private_pem()?.as_bytes())
}

pub fn put_encrypted_private_key_authority(
    depot: &dyn Depot,
    key: &Key,
    passphrase: &[u8],
) -> Result<()> {
    depot.put(
        &authority_key_tag(),
        key.export_encrypted_private_pem(passphrase)?.as_bytes(),
    )
}

pub fn check_private_key_authority(depot: &dyn Depot) -> bool {
    depot.check(&authority_key_tag())
}

pub fn get_private_key_authority(depot: &dyn Depot) -> Result<Key> {
    Key::from_private_pem(&depot.get(&authority_key_tag())?)
}

pub fn get_encrypted_private_key_authority(depot: &dyn Depot, passphrase: &[u8]) -> Result<Key> {
    Key::from_encrypted_private_pem(&depot.get(&authority_key_tag())?, passphrase)
}

pub fn delete_private_key_authority(depot: &dyn Depot) -> Result<()> {
    depot.delete(&authority_key_tag())
}

pub fn put_certificate_host(depot: &dyn Depot, name: &str, crt: &Certificate) -> Result<()> {
    depot.put(&host_crt_tag(name), crt.export().as_bytes())
}

pub fn check_certificate_host(depot: &dyn Depot, name: &str) -> bool {
    depot.check(&host_crt_tag(name))
}

pub fn get_certificate_host(depot: &dyn Depot, name: &str) -> Result<Certificate> {
    Certificate::from_pem(&depot.get(&host_crt_tag(name))?)
}

pub fn delete_certificate_host(depot: &dyn Depot, name: &str) -> Result<()> {
    depot.delete(&host_crt_tag(name))
}

pub fn put_certificate_signing_request(
    depot: &dyn Depot,
    name: &str,
    csr: &CertificateSigningRequest,
) -> Result<()> {
    depot.put(&host_csr_tag(name), csr.export().as_bytes())
}

pub fn check_certificate_signing_request(depot: &dyn Depot, name: &str) -> bool {
    depot.check(&host_csr_tag(name))
}

pub fn get_certificate_signing_request(
    depot: &dyn Depot,
    name: &str,
) -> Result<CertificateSigningRequest> {
    CertificateSigningRequest::from_pem(&depot.get(&host_csr_tag(name))?)
}

pub fn delete_certificate_signing_request(depot: &dyn Depot, name: &str) -> Result<()> {
    depot.delete(&host_csr_tag(name))
}

pub fn put_private_key_host(depot: &dyn Depot, name: &str, key: &Key) -> Result<()> {
    depot.put(&host_key_tag(name), key.export_private_pem()?.as_bytes())
}

pub fn put_encrypted_private_key_host(
    depot: &dyn Depot,
    name: &str,
    key: &Key,
    passphrase: &[u8],
) -> Result<()> {
    depot.put(
        &host_key_tag(name),
        key.export_encrypted_private_pem(passphrase)?.as_bytes(),
    )
}

pub fn check_private_key_host(depot: &dyn Depot, name: &str) -> bool {
    depot.check(&host_key_tag(name))
}

pub fn get_private_key_host(depot: &dyn Depot, name: &str) -> Result<Key> {
    Key::from_private_pem(&depot.get(&host_key_tag(name))?)
}

pub fn get_encrypted_private_key_host(
    depot: &dyn Depot,
    name: &str,
    passphrase: &[u8],
) -> Result<Key> {
    Key::from_encrypted_private_pem(&depot.get(&host_key_tag(name))?, passphrase)
}

pub fn delete_private_key_host(depot: &dyn Depot, name: &str) -> Result<()> {
    depot.delete(&host_key_tag(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depot::kv::{KvDepot, MemoryStore};
    use crate::error::CertDepotError;

    const RSA_KEY_PEM: &str = include_str!("../../tests/fixtures/rsa_key.pem");

    #[test]
    fn test_catalog_names_and_modes() {
        let expected = [
            (authority_crt_tag(), "ca.crt", 0o444),
            (authority_key_tag(), "ca.key", 0o400),
            (authority_info_tag(), "ca.crt.info", 0o400),
            (host_crt_tag("web"), "web.host.crt", 0o444),
            (host_csr_tag("web"), "web.host.csr", 0o444),
            (host_key_tag("web"), "web.host.key", 0o440),
        ];
        for (tag, name, perm) in expected {
            assert_eq!(tag.name(), name);
            assert_eq!(tag.perm(), perm);
        }
    }

    #[test]
    fn test_host_name_from_tags() {
        assert_eq!(host_name_from_crt_tag(&host_crt_tag("web")), Some("web".to_string()));
        assert_eq!(
            host_name_from_crt_tag(&host_crt_tag("a.b.host")),
            Some("a.b.host".to_string())
        );
        assert_eq!(host_name_from_crt_tag(&authority_crt_tag()), None);
        assert_eq!(host_name_from_crt_tag(&host_csr_tag("web")), None);
        assert_eq!(host_name_from_crt_tag(&Tag::new(".host.crt", 0)), None);
        assert_eq!(host_name_from_csr_tag(&host_csr_tag("db")), Some("db".to_string()));
        assert_eq!(host_name_from_csr_tag(&host_key_tag("db")), None);
    }

    #[test]
    fn test_update_info_replaces_stored_value() {
        let depot = KvDepot::new(MemoryStore::new());
        let mut info = CertificateAuthorityInfo::default();
        update_certificate_authority_info(&depot, &info).unwrap();
        info.next_serial();
        assert!(matches!(
            put_certificate_authority_info(&depot, &info),
            Err(CertDepotError::AlreadyExists(_))
        ));
        update_certificate_authority_info(&depot, &info).unwrap();
        assert_eq!(get_certificate_authority_info(&depot).unwrap(), info);
    }

    #[test]
    fn test_encrypted_authority_key() {
        let depot = KvDepot::new(MemoryStore::new());
        let key = Key::from_private_pem(RSA_KEY_PEM.as_bytes()).unwrap();
        put_encrypted_private_key_authority(&depot, &key, b"hunter2").unwrap();
        assert!(check_private_key_authority(&depot));
        let loaded = get_encrypted_private_key_authority(&depot, b"hunter2").unwrap();
        assert_eq!(loaded.export_private_pem().unwrap(), RSA_KEY_PEM);
        assert!(matches!(
            get_encrypted_private_key_authority(&depot, b"wrong"),
            Err(CertDepotError::DecryptionError(_))
        ));
        delete_private_key_authority(&depot).unwrap();
        assert!(!check_private_key_authority(&depot));
    }
}
