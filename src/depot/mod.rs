//! Permission-checked artifact storage.
//!
//! Every artifact is addressed by a [`Tag`]: a name plus the Unix mode bits
//! the stored artifact must carry before it may be read. Storage is put-once:
//! writing a name that already exists fails with
//! [`CertDepotError::AlreadyExists`] and leaves the stored bytes alone.
//!
//! Two backends are provided: [`file::FileDepot`] keeps artifacts as files
//! created with the tag's mode, and [`kv::KvDepot`] keeps them in a key/value
//! store (in memory or etcd) with the mode in a JSON envelope beside the data.

use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CertDepotError, Result};

pub mod etcd;
#[cfg(unix)]
pub mod file;
pub mod kv;
pub mod pkix;

/// Owner read only.
pub const ROOT_PERM: u32 = 0o400;
/// Owner and group read.
pub const BRANCH_PERM: u32 = 0o440;
/// World readable.
pub const LEAF_PERM: u32 = 0o444;

const PERM_MASK: u32 = 0o7777;

/// A stored artifact's name and the permission bits it must carry.
///
/// Tags compare and hash by name only.
#[derive(Debug, Clone)]
pub struct Tag {
    name: String,
    perm: u32,
}

impl Tag {
    pub fn new(name: impl Into<String>, perm: u32) -> Self {
        Self {
            name: name.into(),
            perm: perm & PERM_MASK,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn perm(&self) -> u32 {
        self.perm
    }

    /// True when `mode` carries every bit this tag requires.
    pub fn permits(&self, mode: u32) -> bool {
        mode & self.perm == self.perm
    }

    fn permission_denied(&self, mode: u32) -> CertDepotError {
        tracing::warn!(
            name = %self.name,
            mode = format_args!("{:o}", mode & PERM_MASK),
            required = format_args!("{:o}", self.perm),
            "refusing artifact with insufficient permission bits"
        );
        CertDepotError::PermissionDenied(format!(
            "{} has mode {:o}, requires {:o}",
            self.name,
            mode & PERM_MASK,
            self.perm
        ))
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Stored bytes with their metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotFile {
    /// Permission bits of the stored artifact.
    pub mode: u32,
    pub size: u64,
    pub data: Vec<u8>,
}

/// Put-once storage of tagged artifacts.
pub trait Depot {
    /// Stores `data` under the tag's name with the tag's permission bits.
    ///
    /// Fails with `AlreadyExists` when the name is taken.
    fn put(&self, tag: &Tag, data: &[u8]) -> Result<()>;

    /// True when the artifact exists and carries the tag's permission bits.
    fn check(&self, tag: &Tag) -> bool;

    /// Reads the artifact, refusing it with `PermissionDenied` when its mode
    /// lacks bits the tag requires.
    fn get(&self, tag: &Tag) -> Result<Vec<u8>>;

    fn delete(&self, tag: &Tag) -> Result<()>;

    /// All stored artifacts, each tagged with its actual mode.
    fn list(&self) -> Result<Vec<Tag>>;

    /// Like [`Depot::get`], with the artifact's metadata.
    fn get_file(&self, tag: &Tag) -> Result<DepotFile>;
}

pub const DEFAULT_DEPOT_DIR: &str = ".certdepot";
pub const DEFAULT_ETCD_ENDPOINT: &str = "http://127.0.0.1:2379";
pub const DEFAULT_ETCD_PREFIX: &str = "certdepot/";

fn default_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DEPOT_DIR)
}

fn default_endpoint() -> String {
    DEFAULT_ETCD_ENDPOINT.to_string()
}

fn default_prefix() -> String {
    DEFAULT_ETCD_PREFIX.to_string()
}

/// Where artifacts are kept.
///
/// ```
/// use certdepot::depot::DepotConfig;
/// let config: DepotConfig =
///     serde_json::from_str(r#"{"kind": "etcd", "prefix": "ca/"}"#).unwrap();
/// assert_eq!(
///     config,
///     DepotConfig::Etcd {
///         endpoint: "http://127.0.0.1:2379".to_string(),
///         prefix: "ca/".to_string(),
///     }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepotConfig {
    File {
        #[serde(default = "default_dir")]
        dir: PathBuf,
    },
    Etcd {
        #[serde(default = "default_endpoint")]
        endpoint: String,
        #[serde(default = "default_prefix")]
        prefix: String,
    },
}

impl Default for DepotConfig {
    fn default() -> Self {
        DepotConfig::File { dir: default_dir() }
    }
}

impl DepotConfig {
    /// Builds the configured depot. Nothing is created until the first put.
    pub fn open(&self) -> Result<Box<dyn Depot>> {
        match self {
            #[cfg(unix)]
            DepotConfig::File { dir } => Ok(Box::new(file::FileDepot::new(dir)?)),
            #[cfg(not(unix))]
            DepotConfig::File { .. } => Err(CertDepotError::InvalidConfig(
                "the file depot needs Unix permission bits".to_string(),
            )),
            DepotConfig::Etcd { endpoint, prefix } => {
                let store = etcd::EtcdStore::new(endpoint, prefix)?;
                Ok(Box::new(kv::KvDepot::new(store)))
            }
        }
    }
}
