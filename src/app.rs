use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::catalog::{Handoff, HandoffReport, IngestSink};
use crate::config::ResolvedConfig;
use crate::dispatch::{DispatchReport, dispatch};
use crate::domain::Operation;
use crate::error::GraceError;
use crate::filter::FetchFilter;
use crate::index::{IndexSync, ensure_index};
use crate::links::read_links;
use crate::transfer::Transfer;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force_index: bool,
    pub overwrite_files: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub index: String,
    pub links_found: usize,
    pub selected: usize,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub operation: Operation,
    pub index: Option<IndexSync>,
    pub fetch: Option<FetchResult>,
    pub organize: Option<HandoffReport>,
    pub elapsed_ms: u128,
}

impl RunReport {
    pub fn failed_transfers(&self) -> usize {
        self.fetch
            .as_ref()
            .map(|fetch| fetch.dispatch.failed.len())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Mutable state of a single invocation. Configuration stays read-only in [`App`].
#[derive(Debug)]
pub struct RunContext {
    pub operation: Operation,
    pub force_index: bool,
    pub overwrite_files: bool,
    pub dry_run: bool,
    started: Instant,
    index: Option<IndexSync>,
    fetch: Option<FetchResult>,
    organize: Option<HandoffReport>,
}

impl RunContext {
    pub fn new(operation: Operation, config: &ResolvedConfig, options: RunOptions) -> Self {
        Self {
            operation,
            force_index: options.force_index || config.overwrite.index,
            overwrite_files: options.overwrite_files || config.overwrite.files,
            dry_run: options.dry_run,
            started: Instant::now(),
            index: None,
            fetch: None,
            organize: None,
        }
    }

    pub fn finish(self) -> RunReport {
        RunReport {
            operation: self.operation,
            index: self.index,
            fetch: self.fetch,
            organize: self.organize,
            elapsed_ms: self.started.elapsed().as_millis(),
        }
    }
}

pub struct App<T: Transfer, I: IngestSink> {
    config: ResolvedConfig,
    transfer: T,
    ingest: I,
}

impl<T: Transfer, I: IngestSink> App<T, I> {
    pub fn new(config: ResolvedConfig, transfer: T, ingest: I) -> Self {
        Self {
            config,
            transfer,
            ingest,
        }
    }

    pub fn run(
        &self,
        operation: Operation,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, GraceError> {
        let mut ctx = RunContext::new(operation, &self.config, options);
        info!(%operation, product = %self.config.selector.remote_path(), "starting run");
        match operation {
            Operation::Search => self.search(&mut ctx, sink)?,
            Operation::Fetch => self.fetch(&mut ctx, sink)?,
            Operation::Organize => self.organize(&mut ctx, sink)?,
            Operation::Sync => {
                self.search(&mut ctx, sink)?;
                self.fetch(&mut ctx, sink)?;
                self.organize(&mut ctx, sink)?;
            }
        }
        Ok(ctx.finish())
    }

    pub fn search(&self, ctx: &mut RunContext, sink: &dyn ProgressSink) -> Result<(), GraceError> {
        sink.event(ProgressEvent {
            message: "phase=Search; resolving listing".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let index = ensure_index(
            &self.transfer,
            &self.config.dst_layout,
            &self.config.selector,
            &self.config.server_url,
            ctx.force_index,
        )?;
        let message = if index.refreshed {
            format!("phase=Search; listing saved to {}", index.path)
        } else {
            format!("phase=Search; cached listing at {}", index.path)
        };
        sink.event(ProgressEvent {
            message,
            elapsed: Some(start.elapsed()),
        });
        ctx.index = Some(index);
        Ok(())
    }

    pub fn fetch(&self, ctx: &mut RunContext, sink: &dyn ProgressSink) -> Result<(), GraceError> {
        if ctx.index.is_none() {
            self.search(ctx, sink)?;
        }
        let Some(index) = ctx.index.as_ref() else {
            return Err(GraceError::Filesystem("listing unavailable".to_string()));
        };

        let links = read_links(index.path.as_std_path())?;
        let remote = self.config.selector.remote_path();
        let filter = FetchFilter {
            remote: &remote,
            extension: &self.config.extension,
            server_url: &self.config.server_url,
            layout: &self.config.dst_layout,
            overwrite: ctx.overwrite_files,
        };
        let selected = filter.select(&links);
        info!(found = links.len(), selected = selected.len(), "filtered listing");
        sink.event(ProgressEvent {
            message: format!(
                "phase=Filter; {} references, {} to transfer",
                links.len(),
                selected.len()
            ),
            elapsed: None,
        });

        let start = Instant::now();
        let report = dispatch(&self.transfer, &selected, ctx.dry_run);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Transfer; {} downloaded, {} failed",
                report.downloaded.len(),
                report.failed.len()
            ),
            elapsed: Some(start.elapsed()),
        });

        ctx.fetch = Some(FetchResult {
            index: index.path.to_string(),
            links_found: links.len(),
            selected: selected.len(),
            dispatch: report,
        });
        Ok(())
    }

    pub fn organize(&self, ctx: &mut RunContext, sink: &dyn ProgressSink) -> Result<(), GraceError> {
        let source_dir = self.config.src_layout.solution_set_dir(&self.config.selector);
        sink.event(ProgressEvent {
            message: format!("phase=Organize; scanning {source_dir}"),
            elapsed: None,
        });
        let start = Instant::now();
        let handoff = Handoff {
            selector: &self.config.selector,
            extension: &self.config.extension,
            settings: &self.config.handoff,
        };
        let report = handoff.run(&self.ingest, &source_dir)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Organize; {} handed off, {} skipped",
                report.emitted.len(),
                report.skipped.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        ctx.organize = Some(report);
        Ok(())
    }
}
