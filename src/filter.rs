use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::domain::{ExtensionPolicy, RemotePathSpec};
use crate::layout::Layout;
use crate::links::LinkSet;

/// Stripped from references to obtain the path below the local download root.
pub const REMOTE_ROOT_PREFIX: &str = "/drive/files/allData/tellus/L3/grace/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub href: String,
    pub url: String,
    pub relative_path: String,
    pub destination: Utf8PathBuf,
}

impl LinkRecord {
    /// Returns `None` for references outside the remote root.
    pub fn from_href(href: &str, server_url: &str, download_root: &Utf8Path) -> Option<Self> {
        let start = href.find(REMOTE_ROOT_PREFIX)?;
        let relative_path = href[start + REMOTE_ROOT_PREFIX.len()..].to_string();
        if relative_path.is_empty() || relative_path.split('/').any(|segment| segment == "..") {
            return None;
        }
        Some(Self {
            href: href.to_string(),
            url: object_url(server_url, href),
            destination: download_root.join(&relative_path),
            relative_path,
        })
    }
}

fn object_url(server_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    format!(
        "{}/{}",
        server_url.trim_end_matches('/'),
        href.trim_start_matches('/')
    )
}

/// Decides which extracted references still need to be transferred.
#[derive(Debug, Clone)]
pub struct FetchFilter<'a> {
    pub remote: &'a RemotePathSpec,
    pub extension: &'a ExtensionPolicy,
    pub server_url: &'a str,
    pub layout: &'a Layout,
    pub overwrite: bool,
}

impl FetchFilter<'_> {
    pub fn accepts(&self, record: &LinkRecord) -> bool {
        if !self.remote.contains_in(&record.href) {
            debug!(href = %record.href, "outside product namespace");
            return false;
        }
        if !self.extension.matches(&record.relative_path) {
            debug!(href = %record.href, policy = %self.extension, "extension rejected");
            return false;
        }
        if !self.overwrite && record.destination.as_std_path().exists() {
            debug!(destination = %record.destination, "already present locally");
            return false;
        }
        true
    }

    /// Pure selection: the only I/O is the existence check on each destination.
    pub fn select(&self, links: &LinkSet) -> Vec<LinkRecord> {
        let download_root = self.layout.download_root();
        links
            .iter()
            .filter_map(|href| LinkRecord::from_href(href, self.server_url, &download_root))
            .filter(|record| self.accepts(record))
            .collect()
    }
}
