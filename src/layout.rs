use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::ProductSelector;
use crate::error::GraceError;

pub const INDEX_FILE_NAME: &str = "index.html";

/// Local directory layout rooted at one volume: `<volumes_root>/<volume>`.
#[derive(Debug, Clone)]
pub struct Layout {
    volume_root: Utf8PathBuf,
}

impl Layout {
    pub fn new(volumes_root: &Utf8Path, volume: &str) -> Self {
        Self {
            volume_root: volumes_root.join(volume),
        }
    }

    pub fn volume_root(&self) -> &Utf8Path {
        &self.volume_root
    }

    /// `<volume>/DAAC-GRACE/L3/grace/<feature>/<model>/<version>/<solution_set>`
    pub fn index_dir(&self, selector: &ProductSelector) -> Utf8PathBuf {
        self.volume_root
            .join("DAAC-GRACE")
            .join(selector.remote_path().as_str())
    }

    pub fn index_path(&self, selector: &ProductSelector) -> Utf8PathBuf {
        self.index_dir(selector).join(INDEX_FILE_NAME)
    }

    /// Root that remote-relative paths are joined onto.
    pub fn download_root(&self) -> Utf8PathBuf {
        self.volume_root.join("GRACE")
    }

    pub fn solution_set_dir(&self, selector: &ProductSelector) -> Utf8PathBuf {
        self.download_root().join(selector.product_segments())
    }

    /// Resolves the local index directory and creates it when absent.
    pub fn resolve_local_root(&self, selector: &ProductSelector) -> Result<Utf8PathBuf, GraceError> {
        let dir = self.index_dir(selector);
        ensure_dir(&dir)?;
        Ok(dir)
    }
}

/// Datadir recorded in the catalog, relative to the volume root.
pub fn relative_data_dir(selector: &ProductSelector) -> String {
    format!("GRACE/{}", selector.product_segments())
}

/// Create-if-absent; only an "already exists" outcome on a directory is swallowed.
pub fn ensure_dir(path: &Utf8Path) -> Result<(), GraceError> {
    match fs::create_dir_all(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(err) => Err(GraceError::Filesystem(format!("create {path}: {err}"))),
    }
}
