use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GraceError;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d{2}$").expect("version pattern compiles"));

/// Per-feature cataloging metadata. Features missing from this table are rejected at startup.
#[derive(Debug, PartialEq, Eq)]
pub struct FeatureProfile {
    pub name: &'static str,
    pub content_code: &'static str,
    pub data_unit: &'static str,
}

const FEATURES: &[FeatureProfile] = &[FeatureProfile {
    name: "land_mass",
    content_code: "cm-water",
    data_unit: "cm",
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feature(&'static FeatureProfile);

impl Feature {
    pub fn as_str(&self) -> &'static str {
        self.0.name
    }

    pub fn profile(&self) -> &'static FeatureProfile {
        self.0
    }

    /// Feature name as used in catalog tags (`land_mass` -> `land-mass`).
    pub fn content_tag(&self) -> String {
        self.0.name.replace('_', "-")
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl FromStr for Feature {
    type Err = GraceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        FEATURES
            .iter()
            .find(|profile| profile.name == normalized)
            .map(Feature)
            .ok_or_else(|| GraceError::UnknownFeature(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = GraceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !VERSION_RE.is_match(value) {
            return Err(GraceError::InvalidVersion(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseLevel(String);

impl ReleaseLevel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReleaseLevel {
    type Err = GraceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
            && trimmed != "."
            && trimmed != "..";
        if !is_valid {
            return Err(GraceError::InvalidModel(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SolutionSet {
    Csr,
    Gfz,
    Jpl,
}

impl SolutionSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolutionSet::Csr => "CSR",
            SolutionSet::Gfz => "GFZ",
            SolutionSet::Jpl => "JPL",
        }
    }
}

impl fmt::Display for SolutionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SolutionSet {
    type Err = GraceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "CSR" => Ok(SolutionSet::Csr),
            "GFZ" => Ok(SolutionSet::Gfz),
            "JPL" => Ok(SolutionSet::Jpl),
            _ => Err(GraceError::UnknownSolutionSet(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSelector {
    pub feature: Feature,
    pub model: ReleaseLevel,
    pub version: Version,
    pub solution_set: SolutionSet,
}

impl ProductSelector {
    pub fn parse(
        feature: &str,
        model: &str,
        version: &str,
        solution_set: &str,
    ) -> Result<Self, GraceError> {
        let version = version.parse()?;
        Ok(Self {
            feature: feature.parse()?,
            model: model.parse()?,
            version,
            solution_set: solution_set.parse()?,
        })
    }

    pub fn remote_path(&self) -> RemotePathSpec {
        RemotePathSpec(format!("L3/grace/{}", self.product_segments()))
    }

    /// `<feature>/<model>/<version>/<solution_set>`, shared by remote and local layouts.
    pub fn product_segments(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.feature, self.model, self.version, self.solution_set
        )
    }

    /// `<model>-<version>`, the dataset version tag used in the catalog.
    pub fn dataset_version(&self) -> String {
        format!("{}-{}", self.model, self.version)
    }
}

/// `L3/grace/<feature>/<model>/<version>/<solution_set>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePathSpec(String);

impl RemotePathSpec {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace filter applied to every extracted reference.
    pub fn contains_in(&self, reference: &str) -> bool {
        reference.contains(&self.0)
    }
}

impl fmt::Display for RemotePathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtensionPolicy {
    #[default]
    Any,
    /// Lower-case, with leading dot.
    Exactly(String),
}

impl ExtensionPolicy {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            ExtensionPolicy::Any => true,
            ExtensionPolicy::Exactly(ext) => Path::new(path)
                .extension()
                .and_then(|value| value.to_str())
                .map(|value| value.eq_ignore_ascii_case(ext.strip_prefix('.').unwrap_or(ext)))
                .unwrap_or(false),
        }
    }

    /// Extension without the dot, or `*`.
    pub fn import_code(&self) -> String {
        match self {
            ExtensionPolicy::Any => "*".to_string(),
            ExtensionPolicy::Exactly(ext) => ext.strip_prefix('.').unwrap_or(ext).to_string(),
        }
    }
}

impl fmt::Display for ExtensionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionPolicy::Any => write!(f, "*"),
            ExtensionPolicy::Exactly(ext) => write!(f, "{ext}"),
        }
    }
}

impl FromStr for ExtensionPolicy {
    type Err = GraceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed == "*" {
            return Ok(ExtensionPolicy::Any);
        }
        let bare = trimmed.strip_prefix('.').unwrap_or(trimmed).to_lowercase();
        let is_valid = !bare.is_empty()
            && bare
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(GraceError::InvalidExtension(value.to_string()));
        }
        Ok(ExtensionPolicy::Exactly(format!(".{bare}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Refresh the remote listing document.
    Search,
    /// Download the files referenced by the listing.
    Fetch,
    /// Hand local files off to the catalog.
    Organize,
    /// Search, fetch and organize in one run.
    Sync,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Search => write!(f, "search"),
            Operation::Fetch => write!(f, "fetch"),
            Operation::Organize => write!(f, "organize"),
            Operation::Sync => write!(f, "sync"),
        }
    }
}

impl FromStr for Operation {
    type Err = GraceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "search" | "searchgraceproducts" => Ok(Operation::Search),
            "fetch" | "curlgrace" => Ok(Operation::Fetch),
            "organize" | "organizegrace" => Ok(Operation::Organize),
            "sync" => Ok(Operation::Sync),
            _ => Err(GraceError::UnknownOperation(value.to_string())),
        }
    }
}
