use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::catalog::{HandoffSettings, MalformedPolicy};
use crate::domain::{ExtensionPolicy, ProductSelector, RemotePathSpec};
use crate::error::GraceError;
use crate::layout::Layout;
use crate::transfer::{RetryPolicy, TransferSettings};

pub const DEFAULT_CONFIG_FILE: &str = "grace-sync.json";
pub const DEFAULT_EXTENSION: &str = ".nc";
pub const DEFAULT_VOLUMES_ROOT: &str = "/volumes";
pub const COOKIE_JAR_NAME: &str = ".grace_cookies";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub server_url: String,
    #[serde(default)]
    pub volumes_root: Option<String>,
    pub dst_volume: String,
    #[serde(default)]
    pub src_volume: Option<String>,
    pub product: SelectorConfig,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub overwrite_index: bool,
    #[serde(default)]
    pub overwrite_files: bool,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectorConfig {
    pub feature: String,
    pub model: String,
    pub version: String,
    pub solution_set: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub cookie_jar: Option<String>,
    #[serde(default)]
    pub netrc_file: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HandoffConfig {
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
    #[serde(default)]
    pub cell_null: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub manifest: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverwriteFlags {
    /// Refresh `index.html` even when cached.
    pub index: bool,
    /// Re-transfer files that already exist locally.
    pub files: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server_url: String,
    pub selector: ProductSelector,
    pub dst_layout: Layout,
    pub src_layout: Layout,
    pub extension: ExtensionPolicy,
    pub overwrite: OverwriteFlags,
    pub transfer: TransferSettings,
    pub handoff: HandoffSettings,
    pub manifest: Utf8PathBuf,
}

/// Validates the version and derives the remote listing path.
pub fn resolve_remote_index_path(selector: &SelectorConfig) -> Result<RemotePathSpec, GraceError> {
    Ok(ProductSelector::try_from(selector)?.remote_path())
}

impl TryFrom<&SelectorConfig> for ProductSelector {
    type Error = GraceError;

    fn try_from(value: &SelectorConfig) -> Result<Self, Self::Error> {
        ProductSelector::parse(
            &value.feature,
            &value.model,
            &value.version,
            &value.solution_set,
        )
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GraceError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(GraceError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| GraceError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GraceError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GraceError> {
        let selector = ProductSelector::try_from(&config.product)?;

        let server_url = config.server_url.trim().to_string();
        if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
            return Err(GraceError::ConfigParse(format!(
                "server_url must be an http(s) URL: {server_url:?}"
            )));
        }
        if config.dst_volume.trim().is_empty() {
            return Err(GraceError::ConfigParse("dst_volume must not be empty".to_string()));
        }

        let extension: ExtensionPolicy = config
            .extension
            .as_deref()
            .unwrap_or(DEFAULT_EXTENSION)
            .parse()?;

        let volumes_root =
            Utf8PathBuf::from(config.volumes_root.as_deref().unwrap_or(DEFAULT_VOLUMES_ROOT));
        let dst_layout = Layout::new(&volumes_root, config.dst_volume.trim());
        let src_layout = match config.src_volume.as_deref().map(str::trim) {
            Some(volume) if !volume.is_empty() => Layout::new(&volumes_root, volume),
            _ => dst_layout.clone(),
        };

        let cookie_jar = match config.transfer.cookie_jar {
            Some(path) => Utf8PathBuf::from(path),
            None => default_cookie_jar()?,
        };
        let defaults = RetryPolicy::default();
        let transfer = TransferSettings {
            cookie_jar,
            netrc_file: config.transfer.netrc_file.map(Utf8PathBuf::from),
            timeout: Duration::from_secs(config.transfer.timeout_secs.unwrap_or(600)),
            retry: RetryPolicy {
                max_retries: config.transfer.max_retries.unwrap_or(defaults.max_retries),
                base_delay: config
                    .transfer
                    .retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.base_delay),
            },
        };

        let handoff = HandoffSettings {
            on_malformed: config.handoff.on_malformed,
            cell_null: config.handoff.cell_null.unwrap_or(-9999.0),
            title: config
                .handoff
                .title
                .unwrap_or_else(|| format!("GRACE {} {}", selector.feature, selector.solution_set)),
            label: config
                .handoff
                .label
                .unwrap_or_else(|| format!("GRACE {}", selector.dataset_version())),
        };
        let manifest = config
            .handoff
            .manifest
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| default_manifest(&src_layout, &selector));

        Ok(ResolvedConfig {
            server_url,
            selector,
            dst_layout,
            src_layout,
            extension,
            overwrite: OverwriteFlags {
                index: config.overwrite_index,
                files: config.overwrite_files,
            },
            transfer,
            handoff,
            manifest,
        })
    }
}

fn default_cookie_jar() -> Result<Utf8PathBuf, GraceError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(COOKIE_JAR_NAME)).ok())
        .ok_or_else(|| GraceError::Filesystem("unable to resolve home directory".to_string()))
}

fn default_manifest(layout: &Layout, selector: &ProductSelector) -> Utf8PathBuf {
    layout
        .download_root()
        .join(format!("handoff-{}.jsonl", selector.solution_set.as_str().to_lowercase()))
}
