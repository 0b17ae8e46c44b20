//! # certdepot - A Minimal Certificate Authority in Pure Rust
//!
//! certdepot runs a single-level certificate authority: it creates a self-signed
//! root, generates keys and PKCS#10 requests for named hosts, signs those
//! requests into host certificates and keeps every artifact in a
//! permission-checked depot. Everything is built on the RustCrypto crates;
//! there is no dependency on OpenSSL or ring.
//!
//! ## Supported Formats
//!
//! - **Keys**: RSA, PKCS#1 `RSA PRIVATE KEY` PEM, optionally passphrase-encrypted
//!   (DES-CBC, DES-EDE3-CBC, AES-128/192/256-CBC on read; AES-256-CBC on write)
//! - **Certificates**: X.509 v3, DER and `CERTIFICATE` PEM
//! - **Requests**: PKCS#10, DER and `CERTIFICATE REQUEST` PEM
//! - **Signatures**: SHA-256 with RSA when signing; RSA and ECDSA (P-256, P-384)
//!   with SHA-1/256/384/512 when verifying
//!
//! ## Depot Layout
//!
//! | Artifact | Name | Mode |
//! |---|---|---|
//! | CA certificate | `ca.crt` | `0444` |
//! | CA private key | `ca.key` | `0400` |
//! | CA serial number | `ca.crt.info` | `0400` |
//! | Host certificate | `<name>.host.crt` | `0444` |
//! | Host request | `<name>.host.csr` | `0444` |
//! | Host private key | `<name>.host.key` | `0440` |
//!
//! An artifact is only read back when its stored mode carries every bit of
//! the required mode.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use certdepot::depot::DepotConfig;
//! use certdepot::workflow::{self, HostOptions, InitOptions, SignOptions};
//!
//! # fn main() -> Result<(), certdepot::error::CertDepotError> {
//! let depot = DepotConfig::File { dir: ".certdepot".into() }.open()?;
//!
//! workflow::init_authority(depot.as_ref(), &InitOptions::builder().build())?;
//! workflow::create_host(depot.as_ref(), &HostOptions::builder().name("etcd1").build())?;
//! workflow::sign_host(depot.as_ref(), &SignOptions::builder().name("etcd1").build())?;
//!
//! print!("{}", workflow::chain(depot.as_ref(), Some("etcd1"))?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Using the PKIX Engine Directly
//!
//! ```rust,no_run
//! use certdepot::key::Key;
//! use certdepot::pki::{self, CsrSubject};
//!
//! # fn main() -> Result<(), certdepot::error::CertDepotError> {
//! let ca_key = Key::generate(4096)?;
//! let (ca, mut info) = pki::create_certificate_authority(&ca_key, 10, "Example", "US")?;
//!
//! let host_key = Key::generate(2048)?;
//! let subject = CsrSubject::builder()
//!     .name("web")
//!     .domains(vec!["web.example.com".to_string()])
//!     .build();
//! let csr = pki::create_certificate_signing_request(&host_key, &subject)?;
//! let host = pki::create_certificate_host(&ca, &mut info, &ca_key, &csr, 1, true, false)?;
//!
//! ca.verify_host(&host, "web.example.com")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`error::CertDepotError`]:
//!
//! ```rust
//! use certdepot::{error::CertDepotError, key::Key};
//!
//! match Key::from_private_pem(b"not a key") {
//!     Ok(_) => println!("Key imported"),
//!     Err(CertDepotError::FormatError(msg)) => println!("Not PEM: {}", msg),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: RSA keys, PEM import/export and key encryption
//! - [`cert`]: Certificates, extensions and chain verification
//! - [`csr`]: Certificate signing requests
//! - [`ca_info`]: The authority's serial number counter
//! - [`pki`]: Creating the authority, requests and host certificates
//! - [`issuer`]: Signing certificates
//! - [`tbs_certificate`]: Low-level certificate structure assembly
//! - [`depot`]: Permission-checked storage and the artifact catalog
//! - [`workflow`]: init, new host, sign, status and chain over a depot
//! - [`error`]: Error types

pub mod ca_info;
pub mod cert;
pub mod csr;
pub mod depot;
pub mod error;
pub mod issuer;
pub mod key;
pub mod pem_utils;
pub mod pki;
pub mod tbs_certificate;
pub mod workflow;
