use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use scraper::{ElementRef, Html};

use crate::error::GraceError;

/// Every GRACE L3 product reference on the archive carries this marker.
pub const LINK_MARKER: &str = "/drive/files/allData/tellus/L3/grace";

/// Distinct references keyed by the full `href` string.
pub type LinkSet = BTreeSet<String>;

/// Extracts GRACE product references from a directory-listing document.
///
/// Only `href` attributes on `<a>` elements are considered, and only when
/// they contain [`LINK_MARKER`]. Two anchors with an identical `href` yield a
/// single entry. The parser recovers from malformed markup, so this never
/// fails; fragments it cannot make sense of simply contribute nothing.
pub fn extract_links(document: &str) -> LinkSet {
    let html = Html::parse_document(document);
    html.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name().eq_ignore_ascii_case("a"))
        .filter_map(|element| element.value().attr("href"))
        .filter(|href| href.contains(LINK_MARKER))
        .map(str::to_string)
        .collect()
}

/// Reads a saved listing from disk and extracts its references.
pub fn read_links(path: &Path) -> Result<LinkSet, GraceError> {
    let bytes = fs::read(path)
        .map_err(|err| GraceError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(extract_links(&String::from_utf8_lossy(&bytes)))
}
