use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{ExtensionPolicy, ProductSelector};
use crate::error::GraceError;
use crate::layout::{ensure_dir, relative_data_dir};

static YEAR_DOY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(\d{3})$").expect("year-doy pattern compiles"));

/// Source key of the single raw-source entry sent with every record.
pub const SOURCE_KEY: &str = "grace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Parses a `YYYYDDD` token.
pub fn parse_year_doy(token: &str) -> Option<NaiveDate> {
    let caps = YEAR_DOY_RE.captures(token)?;
    let year: i32 = caps[1].parse().ok()?;
    let ordinal: u32 = caps[2].parse().ok()?;
    NaiveDate::from_yo_opt(year, ordinal)
}

/// Reads the coverage window from a name such as
/// `GRD-3_2020032-2020059_GRFO_UTCSR_BA01_0600_LND_v03.nc`.
pub fn parse_coverage(file_name: &str) -> Result<Coverage, GraceError> {
    let malformed = || GraceError::MalformedFilename(file_name.to_string());
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(malformed)?;
    let field = stem.split('_').nth(1).ok_or_else(malformed)?;
    let (start, end) = field.split_once('-').ok_or_else(malformed)?;
    Ok(Coverage {
        start: parse_year_doy(start).ok_or_else(malformed)?,
        end: parse_year_doy(end).ok_or_else(malformed)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timestep {
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquisitionRecord {
    pub acqdate: NaiveDate,
    pub acqdatestr: String,
    pub timestep: Timestep,
}

impl AcquisitionRecord {
    /// Monthly solutions are stamped to the first day of the month the
    /// coverage starts in, whatever the exact start day.
    pub fn monthly(start: NaiveDate) -> Self {
        let acqdate = start.with_day(1).unwrap_or(start);
        Self {
            acqdatestr: acqdate.format("%Y%m").to_string(),
            acqdate,
            timestep: Timestep::Monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionDescriptor {
    pub source: String,
    pub content: String,
    pub product: String,
    pub layerid: String,
    pub prefix: String,
    pub suffix: String,
    pub scalefac: f64,
    pub offsetadd: f64,
    pub dataunit: String,
    pub celltype: String,
    pub cellnull: f64,
    pub measure: String,
    pub masked: String,
}

impl CompositionDescriptor {
    pub fn for_selector(selector: &ProductSelector, cell_null: f64) -> Self {
        let profile = selector.feature.profile();
        Self {
            source: "nasa-grace".to_string(),
            content: selector.feature.content_tag(),
            product: format!("grace-{}", selector.solution_set.as_str().to_lowercase()),
            layerid: profile.content_code.to_string(),
            prefix: profile.content_code.to_string(),
            suffix: selector.dataset_version(),
            scalefac: 1.0,
            offsetadd: 0.0,
            dataunit: profile.data_unit.to_string(),
            celltype: "Float32".to_string(),
            cellnull: cell_null,
            measure: "R".to_string(),
            masked: "Y".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetDescriptor {
    pub orgid: String,
    pub dsname: String,
    pub dsversion: String,
    pub importcode: String,
    pub epsg: u32,
    pub regionid: String,
    pub regioncat: String,
    pub copyright: String,
}

impl DatasetDescriptor {
    pub fn for_selector(selector: &ProductSelector, extension: &ExtensionPolicy) -> Self {
        Self {
            orgid: "NASA-GRACE".to_string(),
            dsname: format!("GRACE-{}", selector.feature.content_tag()),
            dsversion: selector.dataset_version(),
            importcode: extension.import_code(),
            epsg: 4326,
            regionid: "global".to_string(),
            regioncat: "global".to_string(),
            copyright: "Open".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDescriptor {
    pub datadir: String,
    pub datalayer: String,
    pub datafile: String,
    pub cellnull: f64,
    pub title: String,
    pub label: String,
}

/// One ingestion call: everything the catalog needs for a single file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffRecord {
    pub dataset: DatasetDescriptor,
    pub composition: CompositionDescriptor,
    pub source: BTreeMap<String, SourceDescriptor>,
    pub acquisition: AcquisitionRecord,
}

/// The external cataloging component.
pub trait IngestSink {
    fn ingest(&self, record: &HandoffRecord) -> Result<(), GraceError>;
}

impl<S: IngestSink + ?Sized> IngestSink for &S {
    fn ingest(&self, record: &HandoffRecord) -> Result<(), GraceError> {
        (**self).ingest(record)
    }
}

/// Appends each record as one JSON line to a manifest file.
#[derive(Debug, Clone)]
pub struct JsonLinesIngest {
    path: Utf8PathBuf,
}

impl JsonLinesIngest {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl IngestSink for JsonLinesIngest {
    fn ingest(&self, record: &HandoffRecord) -> Result<(), GraceError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let line = serde_json::to_string(record).map_err(|err| GraceError::Ingest(err.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| GraceError::Ingest(format!("open {}: {err}", self.path)))?;
        writeln!(file, "{line}").map_err(|err| GraceError::Ingest(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandoffSettings {
    pub on_malformed: MalformedPolicy,
    pub cell_null: f64,
    pub title: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HandoffReport {
    pub source_dir: String,
    pub emitted: Vec<EmittedFile>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmittedFile {
    pub file: String,
    pub acqdatestr: String,
    pub coverage_end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

/// Builds per-run descriptors once and emits one record per matching file.
pub struct Handoff<'a> {
    pub selector: &'a ProductSelector,
    pub extension: &'a ExtensionPolicy,
    pub settings: &'a HandoffSettings,
}

impl Handoff<'_> {
    pub fn run<S: IngestSink + ?Sized>(
        &self,
        sink: &S,
        source_dir: &Utf8Path,
    ) -> Result<HandoffReport, GraceError> {
        let mut report = HandoffReport {
            source_dir: source_dir.to_string(),
            ..HandoffReport::default()
        };
        if !source_dir.is_dir() {
            warn!(dir = %source_dir, "source directory missing, nothing to organize");
            return Ok(report);
        }

        let dataset = DatasetDescriptor::for_selector(self.selector, self.extension);
        let composition = CompositionDescriptor::for_selector(self.selector, self.settings.cell_null);
        let datadir = relative_data_dir(self.selector);

        // Every name is parsed before the first record leaves, so an abort hands off nothing.
        let mut accepted = Vec::new();
        for file_name in self.list_sources(source_dir)? {
            match parse_coverage(&file_name) {
                Ok(coverage) => accepted.push((file_name, coverage)),
                Err(err) if self.skips_malformed() => {
                    warn!(file = %file_name, "skipping file with malformed name");
                    report.skipped.push(SkippedFile {
                        file: file_name,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        for (file_name, coverage) in accepted {
            let acquisition = AcquisitionRecord::monthly(coverage.start);
            let source = SourceDescriptor {
                datadir: datadir.clone(),
                datalayer: "0".to_string(),
                datafile: file_name.clone(),
                cellnull: self.settings.cell_null,
                title: self.settings.title.clone(),
                label: self.settings.label.clone(),
            };
            let record = HandoffRecord {
                dataset: dataset.clone(),
                composition: composition.clone(),
                source: BTreeMap::from([(SOURCE_KEY.to_string(), source)]),
                acquisition,
            };
            sink.ingest(&record)?;
            info!(file = %file_name, acqdate = %record.acquisition.acqdatestr, "handed off");
            report.emitted.push(EmittedFile {
                file: file_name,
                acqdatestr: record.acquisition.acqdatestr.clone(),
                coverage_end: coverage.end,
            });
        }
        Ok(report)
    }

    /// A wildcard extension pulls in auxiliary files (READMEs, checksums), which are never products.
    fn skips_malformed(&self) -> bool {
        self.settings.on_malformed == MalformedPolicy::Skip || *self.extension == ExtensionPolicy::Any
    }

    fn list_sources(&self, source_dir: &Utf8Path) -> Result<Vec<String>, GraceError> {
        let entries = fs::read_dir(source_dir.as_std_path())
            .map_err(|err| GraceError::Filesystem(format!("read {source_dir}: {err}")))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| GraceError::Filesystem(err.to_string()))?;
            if !entry.path().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Leftovers from interrupted transfers.
            if name.starts_with(".grace-sync") {
                continue;
            }
            if self.extension.matches(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
