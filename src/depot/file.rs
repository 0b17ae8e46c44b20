use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use super::{Depot, DepotFile, PERM_MASK, Tag};
use crate::error::{CertDepotError, Result};

const DIR_MODE: u32 = 0o755;

/// Artifacts as files in one directory, each created with its tag's mode.
#[derive(Debug, Clone)]
pub struct FileDepot {
    dir: PathBuf,
}

fn io_error(name: &str, err: io::Error) -> CertDepotError {
    match err.kind() {
        io::ErrorKind::AlreadyExists => CertDepotError::AlreadyExists(name.to_string()),
        io::ErrorKind::NotFound => CertDepotError::NotFound(name.to_string()),
        io::ErrorKind::PermissionDenied => {
            CertDepotError::PermissionDenied(format!("{name}: {err}"))
        }
        _ => CertDepotError::Io(format!("{name}: {err}")),
    }
}

impl FileDepot {
    /// Resolves `dir` to an absolute path; the directory is created on first put.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = std::path::absolute(dir.as_ref())?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, tag: &Tag) -> Result<PathBuf> {
        let name = tag.name();
        // tags name files directly inside the depot
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(CertDepotError::PermissionDenied(format!(
                "{name:?} is not a plain file name"
            )));
        }
        Ok(self.dir.join(name))
    }

    fn checked_metadata(&self, tag: &Tag) -> Result<fs::Metadata> {
        let metadata = fs::metadata(self.path(tag)?).map_err(|e| io_error(tag.name(), e))?;
        let mode = metadata.permissions().mode();
        if !tag.permits(mode) {
            return Err(tag.permission_denied(mode));
        }
        Ok(metadata)
    }
}

impl Depot for FileDepot {
    fn put(&self, tag: &Tag, data: &[u8]) -> Result<()> {
        let path = self.path(tag)?;
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&self.dir)
            .map_err(|e| io_error(&self.dir.display().to_string(), e))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(tag.perm())
            .open(&path)
            .map_err(|e| io_error(tag.name(), e))?;

        let written = file
            .write_all(data)
            // the umask may have cleared bits at creation
            .and_then(|()| file.set_permissions(fs::Permissions::from_mode(tag.perm())));
        if let Err(err) = written {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(io_error(tag.name(), err));
        }

        tracing::debug!(name = %tag.name(), size = data.len(), "stored artifact");
        Ok(())
    }

    fn check(&self, tag: &Tag) -> bool {
        self.path(tag)
            .and_then(|path| fs::metadata(path).map_err(CertDepotError::from))
            .map(|metadata| tag.permits(metadata.permissions().mode()))
            .unwrap_or(false)
    }

    fn get(&self, tag: &Tag) -> Result<Vec<u8>> {
        self.checked_metadata(tag)?;
        let data = fs::read(self.path(tag)?).map_err(|e| io_error(tag.name(), e))?;
        tracing::debug!(name = %tag.name(), "read artifact");
        Ok(data)
    }

    fn delete(&self, tag: &Tag) -> Result<()> {
        fs::remove_file(self.path(tag)?).map_err(|e| io_error(tag.name(), e))?;
        tracing::debug!(name = %tag.name(), "deleted artifact");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Tag>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.dir.display().to_string(), err)),
        };

        let mut tags = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            tags.push(Tag::new(name, metadata.permissions().mode() & PERM_MASK));
        }
        tags.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(tags)
    }

    fn get_file(&self, tag: &Tag) -> Result<DepotFile> {
        let metadata = self.checked_metadata(tag)?;
        let data = fs::read(self.path(tag)?).map_err(|e| io_error(tag.name(), e))?;
        Ok(DepotFile {
            mode: metadata.permissions().mode() & PERM_MASK,
            size: metadata.len(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depot::{BRANCH_PERM, LEAF_PERM, ROOT_PERM};

    fn depot() -> (tempfile::TempDir, FileDepot) {
        let dir = tempfile::tempdir().unwrap();
        let depot = FileDepot::new(dir.path().join("depot")).unwrap();
        (dir, depot)
    }

    #[test]
    fn test_files_carry_the_tag_mode() {
        let (_dir, depot) = depot();
        for (name, perm) in [("a", LEAF_PERM), ("b", BRANCH_PERM), ("c", ROOT_PERM)] {
            depot.put(&Tag::new(name, perm), b"x").unwrap();
            let mode = fs::metadata(depot.dir().join(name)).unwrap().permissions().mode();
            assert_eq!(mode & PERM_MASK, perm);
        }
        let dir_mode = fs::metadata(depot.dir()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o700, 0o700);
    }

    #[test]
    fn test_rejects_names_outside_the_directory() {
        let (_dir, depot) = depot();
        for name in ["", ".", "..", "../escape", "sub/file"] {
            assert!(matches!(
                depot.put(&Tag::new(name, LEAF_PERM), b"x"),
                Err(CertDepotError::PermissionDenied(_))
            ));
            assert!(!depot.check(&Tag::new(name, LEAF_PERM)));
        }
    }

    #[test]
    fn test_list_skips_subdirectories() {
        let (_dir, depot) = depot();
        assert!(depot.list().unwrap().is_empty());
        depot.put(&Tag::new("top", LEAF_PERM), b"x").unwrap();
        fs::create_dir(depot.dir().join("nested")).unwrap();
        fs::write(depot.dir().join("nested").join("inner"), b"y").unwrap();
        let names: Vec<_> = depot.list().unwrap().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["top".to_string()]);
    }
}
