use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use grace_sync::app::{App, RunOptions};
use grace_sync::catalog::{HandoffRecord, IngestSink};
use grace_sync::config::{Config, ConfigLoader, ResolvedConfig};
use grace_sync::domain::Operation;
use grace_sync::error::GraceError;
use grace_sync::output::JsonOutput;
use grace_sync::transfer::Transfer;

const LISTING: &str = r#"<html><body><table>
<tr><td><a href="/drive/files/allData/tellus/L3/grace/land_mass/RL06/v03/CSR/GRD-3_2020032-2020059_GRFO_UTCSR_BA01_0600_LND_v03.nc">Feb</a></td></tr>
<tr><td><a href="/drive/files/allData/tellus/L3/grace/land_mass/RL06/v03/CSR/GRD-3_2020061-2020091_GRFO_UTCSR_BA01_0600_LND_v03.nc">Mar</a></td></tr>
<tr><td><a href="/drive/files/allData/tellus/L3/grace/land_mass/RL06/v03/CSR/GRD-3_2020061-2020091_GRFO_UTCSR_BA01_0600_LND_v03.nc">Mar again</a></td></tr>
<tr><td><a href="/drive/files/allData/tellus/L3/grace/land_mass/RL06/v03/CSR/README.txt">readme</a></td></tr>
<tr><td><a href="/drive/files/allData/tellus/L3/grace/land_mass/RL06/v03/JPL/GRD-3_2020032-2020059_GRFO_JPLEM_BA01_0600_LND_v03.nc">JPL</a></td></tr>
<tr><td><a href="/drive/files/allData/tellus/L3/gracefo/other.nc">other</a></td></tr>
</table></body></html>"#;

#[derive(Default)]
struct MockTransfer {
    listings: Mutex<usize>,
    objects: Mutex<Vec<String>>,
    fail_containing: Option<&'static str>,
}

impl Transfer for MockTransfer {
    fn fetch_listing(&self, _url: &str, destination: &Path) -> Result<(), GraceError> {
        *self.listings.lock().unwrap() += 1;
        std::fs::write(destination, LISTING).unwrap();
        Ok(())
    }

    fn fetch_object(&self, url: &str, destination: &Path) -> Result<(), GraceError> {
        if let Some(fragment) = self.fail_containing {
            if url.contains(fragment) {
                return Err(GraceError::Transfer {
                    tool: "curl".to_string(),
                    code: Some(22),
                    message: "The requested URL returned error: 404".to_string(),
                });
            }
        }
        self.objects.lock().unwrap().push(url.to_string());
        std::fs::write(destination, b"netcdf").unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct MockIngest {
    records: Mutex<Vec<HandoffRecord>>,
}

impl IngestSink for MockIngest {
    fn ingest(&self, record: &HandoffRecord) -> Result<(), GraceError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn resolved(root: &Path, extra: serde_json::Value) -> ResolvedConfig {
    let mut value = serde_json::json!({
        "server_url": "https://archive.example.org",
        "volumes_root": root.to_str().unwrap(),
        "dst_volume": "karttur",
        "product": {"feature": "land_mass", "model": "RL06", "version": "v03", "solution_set": "CSR"},
        "extension": ".nc",
        "transfer": {"cookie_jar": root.join("cookies").to_str().unwrap()},
        "handoff": {"manifest": root.join("handoff.jsonl").to_str().unwrap()}
    });
    if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (key, field) in extra {
            target.insert(key.clone(), field.clone());
        }
    }
    let config: Config = serde_json::from_value(value).unwrap();
    ConfigLoader::resolve_config(config).unwrap()
}

fn solution_dir(root: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(root.join("karttur/GRACE/land_mass/RL06/v03/CSR")).unwrap()
}

fn write_product(dir: &Utf8PathBuf, name: &str) {
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    std::fs::write(dir.join(name), b"x").unwrap();
}

#[test]
fn search_reuses_cached_listing() {
    let temp = tempfile::tempdir().unwrap();
    let transfer = MockTransfer::default();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        &transfer,
        MockIngest::default(),
    );

    let first = app
        .run(Operation::Search, RunOptions::default(), &JsonOutput)
        .unwrap();
    let second = app
        .run(Operation::Search, RunOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(*transfer.listings.lock().unwrap(), 1);
    let first = first.index.unwrap();
    let second = second.index.unwrap();
    assert!(first.refreshed);
    assert!(!second.refreshed);
    assert_eq!(first.path, second.path);
    assert!(
        first
            .path
            .as_str()
            .ends_with("karttur/DAAC-GRACE/L3/grace/land_mass/RL06/v03/CSR/index.html")
    );
}

#[test]
fn forced_search_refreshes_listing() {
    let temp = tempfile::tempdir().unwrap();
    let transfer = MockTransfer::default();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        &transfer,
        MockIngest::default(),
    );
    app.run(Operation::Search, RunOptions::default(), &JsonOutput)
        .unwrap();
    let report = app
        .run(
            Operation::Search,
            RunOptions {
                force_index: true,
                ..RunOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    assert!(report.index.unwrap().refreshed);
    assert_eq!(*transfer.listings.lock().unwrap(), 2);
}

#[test]
fn fetch_selects_new_product_files_only() {
    let temp = tempfile::tempdir().unwrap();
    let transfer = MockTransfer::default();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        &transfer,
        MockIngest::default(),
    );

    let report = app
        .run(Operation::Fetch, RunOptions::default(), &JsonOutput)
        .unwrap();
    let fetch = report.fetch.unwrap();
    assert_eq!(fetch.links_found, 5);
    assert_eq!(fetch.selected, 2);
    assert_eq!(fetch.dispatch.downloaded.len(), 2);
    assert!(fetch.dispatch.failed.is_empty());
    assert!(
        transfer
            .objects
            .lock()
            .unwrap()
            .iter()
            .all(|url| url.starts_with("https://archive.example.org/drive/files/allData/tellus/L3/grace/land_mass/RL06/v03/CSR/"))
    );

    let dir = solution_dir(temp.path());
    assert!(
        dir.join("GRD-3_2020032-2020059_GRFO_UTCSR_BA01_0600_LND_v03.nc")
            .is_file()
    );
    assert!(!dir.join("README.txt").exists());

    // Second pass: everything is already local.
    let again = app
        .run(Operation::Fetch, RunOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(again.fetch.unwrap().selected, 0);
    assert_eq!(*transfer.listings.lock().unwrap(), 1);
}

#[test]
fn overwrite_reselects_existing_files() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        MockTransfer::default(),
        MockIngest::default(),
    );
    app.run(Operation::Fetch, RunOptions::default(), &JsonOutput)
        .unwrap();

    let report = app
        .run(
            Operation::Fetch,
            RunOptions {
                overwrite_files: true,
                ..RunOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(report.fetch.unwrap().selected, 2);
}

#[test]
fn failed_transfer_does_not_stop_the_queue() {
    let temp = tempfile::tempdir().unwrap();
    let transfer = MockTransfer {
        fail_containing: Some("2020032-2020059"),
        ..MockTransfer::default()
    };
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        transfer,
        MockIngest::default(),
    );

    let report = app
        .run(Operation::Fetch, RunOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(report.failed_transfers(), 1);
    let fetch = report.fetch.unwrap();
    assert_eq!(fetch.dispatch.downloaded.len(), 1);
    assert!(fetch.dispatch.failed[0].url.contains("2020032-2020059"));
}

#[test]
fn dry_run_transfers_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        MockTransfer::default(),
        MockIngest::default(),
    );
    let report = app
        .run(
            Operation::Fetch,
            RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    let fetch = report.fetch.unwrap();
    assert_eq!(fetch.dispatch.planned.len(), 2);
    assert!(fetch.dispatch.downloaded.is_empty());
    assert!(!solution_dir(temp.path()).exists());
}

#[test]
fn sync_hands_off_month_start_records() {
    let temp = tempfile::tempdir().unwrap();
    let ingest = MockIngest::default();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        MockTransfer::default(),
        &ingest,
    );

    let report = app
        .run(Operation::Sync, RunOptions::default(), &JsonOutput)
        .unwrap();
    let organize = report.organize.unwrap();
    assert_eq!(organize.emitted.len(), 2);
    assert_eq!(organize.emitted[0].acqdatestr, "202002");
    assert_eq!(organize.emitted[1].acqdatestr, "202003");
    assert_eq!(ingest.records.lock().unwrap().len(), 2);
}

#[test]
fn wildcard_sync_skips_auxiliary_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let transfer = MockTransfer::default();
    let ingest = MockIngest::default();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({"extension": "*"})),
        &transfer,
        &ingest,
    );

    let report = app
        .run(Operation::Sync, RunOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(transfer.objects.lock().unwrap().len(), 3);
    let organize = report.organize.unwrap();
    assert_eq!(organize.emitted.len(), 2);
    assert_eq!(organize.skipped.len(), 1);
    assert_eq!(organize.skipped[0].file, "README.txt");
    assert_eq!(ingest.records.lock().unwrap().len(), 2);
}

#[test]
fn organize_record_contents() {
    let temp = tempfile::tempdir().unwrap();
    let dir = solution_dir(temp.path());
    write_product(&dir, "GRD-3_2020032-2020059_GRFO_UTCSR_BA01_0600_LND_v03.nc");
    write_product(&dir, "notes.txt");

    let ingest = MockIngest::default();
    let app = App::new(
        resolved(
            temp.path(),
            serde_json::json!({"handoff": {"cell_null": -32768.0}}),
        ),
        MockTransfer::default(),
        &ingest,
    );
    app.run(Operation::Organize, RunOptions::default(), &JsonOutput)
        .unwrap();

    let records = ingest.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(
        record.acquisition.acqdate,
        chrono::NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()
    );
    assert_eq!(record.composition.product, "grace-csr");
    assert_eq!(record.composition.cellnull, -32768.0);
    let source = &record.source["grace"];
    assert_eq!(source.datadir, "GRACE/land_mass/RL06/v03/CSR");
    assert_eq!(
        source.datafile,
        "GRD-3_2020032-2020059_GRFO_UTCSR_BA01_0600_LND_v03.nc"
    );
    assert_eq!(record.dataset.dsversion, "RL06-v03");
}

#[test]
fn malformed_name_aborts_by_default() {
    let temp = tempfile::tempdir().unwrap();
    let dir = solution_dir(temp.path());
    write_product(&dir, "GRD-3_2020032-2020059_GRFO_UTCSR_BA01_0600_LND_v03.nc");
    write_product(&dir, "ZZZ_badtoken.nc");

    let ingest = MockIngest::default();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        MockTransfer::default(),
        &ingest,
    );
    let err = app
        .run(Operation::Organize, RunOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, GraceError::MalformedFilename(_));
    assert!(ingest.records.lock().unwrap().is_empty());
}

#[test]
fn malformed_name_skipped_when_configured() {
    let temp = tempfile::tempdir().unwrap();
    let dir = solution_dir(temp.path());
    write_product(&dir, "GRACE_badtoken.nc");
    write_product(&dir, "GRD-3_2020061-2020091_GRFO_UTCSR_BA01_0600_LND_v03.nc");

    let app = App::new(
        resolved(
            temp.path(),
            serde_json::json!({"handoff": {"on_malformed": "skip"}}),
        ),
        MockTransfer::default(),
        MockIngest::default(),
    );
    let report = app
        .run(Operation::Organize, RunOptions::default(), &JsonOutput)
        .unwrap();
    let organize = report.organize.unwrap();
    assert_eq!(organize.emitted.len(), 1);
    assert_eq!(organize.skipped.len(), 1);
    assert_eq!(organize.skipped[0].file, "GRACE_badtoken.nc");
}

#[test]
fn organize_without_source_dir_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        resolved(temp.path(), serde_json::json!({})),
        MockTransfer::default(),
        MockIngest::default(),
    );
    let report = app
        .run(Operation::Organize, RunOptions::default(), &JsonOutput)
        .unwrap();
    assert!(report.organize.unwrap().emitted.is_empty());
}
