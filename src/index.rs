use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::domain::ProductSelector;
use crate::error::GraceError;
use crate::layout::Layout;
use crate::links::LINK_MARKER;
use crate::transfer::Transfer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSync {
    pub path: Utf8PathBuf,
    pub url: String,
    /// False when a cached listing was reused.
    pub refreshed: bool,
}

/// `<server>/drive/files/allData/tellus/<remote path>/`
pub fn listing_url(server_url: &str, selector: &ProductSelector) -> String {
    let tellus = LINK_MARKER.trim_end_matches("/L3/grace");
    format!(
        "{}{}/{}/",
        server_url.trim_end_matches('/'),
        tellus,
        selector.remote_path()
    )
}

/// Makes sure the listing document for `selector` exists locally.
///
/// A present `index.html` is reused untouched unless `force` is set; this is
/// the only cache in the pipeline.
pub fn ensure_index<T: Transfer + ?Sized>(
    transfer: &T,
    layout: &Layout,
    selector: &ProductSelector,
    server_url: &str,
    force: bool,
) -> Result<IndexSync, GraceError> {
    let dir = layout.resolve_local_root(selector)?;
    let path = dir.join(crate::layout::INDEX_FILE_NAME);
    let url = listing_url(server_url, selector);

    if path.as_std_path().exists() && !force {
        info!(path = %path, "reusing cached listing");
        return Ok(IndexSync {
            path,
            url,
            refreshed: false,
        });
    }

    info!(url = %url, path = %path, "fetching listing");
    transfer.fetch_listing(&url, path.as_std_path())?;
    if !path.as_std_path().exists() {
        return Err(GraceError::Transfer {
            tool: "listing".to_string(),
            code: None,
            message: format!("transfer reported success but {path} is missing"),
        });
    }

    Ok(IndexSync {
        path,
        url,
        refreshed: true,
    })
}
