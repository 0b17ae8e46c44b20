#![allow(dead_code)]

use certdepot::depot::file::FileDepot;
use certdepot::key::Key;
use tracing_subscriber::EnvFilter;

pub const RSA_KEY_PEM: &str = include_str!("fixtures/rsa_key.pem");
pub const RSA_KEY_DES3_PEM: &str = include_str!("fixtures/rsa_key_des3_encrypted.pem");
pub const RSA_KEY_DES3_PASSPHRASE: &[u8] = b"123456";
pub const HOST_CSR_PEM: &str = include_str!("fixtures/host_sha1.csr");

/// Small keys keep generation fast; the library itself does not care.
pub const TEST_KEY_BITS: usize = 1024;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fixture_key() -> Key {
    Key::from_private_pem(RSA_KEY_PEM.as_bytes()).unwrap()
}

/// A depot in a fresh temporary directory; keep the guard alive while using it.
pub fn file_depot() -> (tempfile::TempDir, FileDepot) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let depot = FileDepot::new(dir.path().join("depot")).unwrap();
    (dir, depot)
}
