use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tracing::{debug, warn};

use crate::error::GraceError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fetches remote documents into local files.
///
/// Implementations must either leave a complete file at `destination` or
/// return an error; callers never inspect partial output.
pub trait Transfer {
    fn fetch_listing(&self, url: &str, destination: &Path) -> Result<(), GraceError>;
    fn fetch_object(&self, url: &str, destination: &Path) -> Result<(), GraceError>;
}

impl<T: Transfer + ?Sized> Transfer for &T {
    fn fetch_listing(&self, url: &str, destination: &Path) -> Result<(), GraceError> {
        (**self).fetch_listing(url, destination)
    }

    fn fetch_object(&self, url: &str, destination: &Path) -> Result<(), GraceError> {
        (**self).fetch_object(url, destination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt).unwrap_or(u32::MAX).saturating_add(1);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub cookie_jar: Utf8PathBuf,
    pub netrc_file: Option<Utf8PathBuf>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub code: Option<i32>,
    pub success: bool,
    pub stderr: String,
}

/// Runs `program` to completion, killing it once `timeout` elapses.
///
/// Stdout is discarded; stderr is spooled through an anonymous temp file so
/// a chatty child can never block on a full pipe.
pub fn run_with_timeout(
    program: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutcome, GraceError> {
    let tool = tool_name(program);
    let mut spool = tempfile::tempfile().map_err(|err| GraceError::Filesystem(err.to_string()))?;
    let child_stderr = spool
        .try_clone()
        .map_err(|err| GraceError::Filesystem(err.to_string()))?;

    debug!(%tool, ?args, "spawning");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(child_stderr))
        .spawn()
        .map_err(|err| GraceError::Transfer {
            tool: tool.clone(),
            code: None,
            message: err.to_string(),
        })?;

    let started = Instant::now();
    let status = loop {
        let polled = child.try_wait().map_err(|err| GraceError::Transfer {
            tool: tool.clone(),
            code: None,
            message: err.to_string(),
        })?;
        if let Some(status) = polled {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GraceError::TransferTimeout {
                tool,
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut raw = Vec::new();
    spool
        .seek(SeekFrom::Start(0))
        .and_then(|_| spool.read_to_end(&mut raw))
        .map_err(|err| GraceError::Filesystem(err.to_string()))?;

    Ok(CommandOutcome {
        code: status.code(),
        success: status.success(),
        stderr: String::from_utf8_lossy(&raw).trim().to_string(),
    })
}

/// Like [`run_with_timeout`], but a non-zero exit becomes [`GraceError::Transfer`].
pub fn run_checked(program: &Path, args: &[String], timeout: Duration) -> Result<(), GraceError> {
    let outcome = run_with_timeout(program, args, timeout)?;
    if outcome.success {
        return Ok(());
    }
    let message = outcome
        .stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| format!("command failed: {}", program.display()));
    Err(GraceError::Transfer {
        tool: tool_name(program),
        code: outcome.code,
        message,
    })
}

/// Retries transient failures with linear backoff.
pub fn run_with_retry(
    program: &Path,
    args: &[String],
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<(), GraceError> {
    let mut attempt = 0usize;
    loop {
        match run_checked(program, args, timeout) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < retry.max_retries && err.is_retryable() => {
                let delay = retry.delay_for(attempt);
                warn!(error = %err, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "transient transfer failure, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// `wget` for listings, `curl` for objects, both sharing one cookie jar.
#[derive(Clone)]
pub struct SystemTransfer {
    wget: Option<PathBuf>,
    curl: Option<PathBuf>,
    settings: TransferSettings,
}

impl SystemTransfer {
    pub fn new(settings: TransferSettings) -> Self {
        Self {
            wget: find_in_path("wget"),
            curl: find_in_path("curl"),
            settings,
        }
    }

    fn require(tool: &Option<PathBuf>, name: &str) -> Result<PathBuf, GraceError> {
        tool.clone()
            .ok_or_else(|| GraceError::MissingTool(name.to_string()))
    }

    pub fn listing_args(&self, url: &str, output: &Path) -> Vec<String> {
        let jar = self.settings.cookie_jar.to_string();
        vec![
            "--no-verbose".to_string(),
            "--load-cookies".to_string(),
            jar.clone(),
            "--save-cookies".to_string(),
            jar,
            "--auth-no-challenge".to_string(),
            "--keep-session-cookies".to_string(),
            "--content-disposition".to_string(),
            "--output-document".to_string(),
            output.to_string_lossy().to_string(),
            url.to_string(),
        ]
    }

    pub fn object_args(&self, url: &str, output: &Path) -> Vec<String> {
        let jar = self.settings.cookie_jar.to_string();
        let mut args = match &self.settings.netrc_file {
            Some(netrc) => vec!["--netrc-file".to_string(), netrc.to_string()],
            None => vec!["--netrc".to_string()],
        };
        args.extend([
            "--location".to_string(),
            "--fail".to_string(),
            "--silent".to_string(),
            "--show-error".to_string(),
            "--cookie-jar".to_string(),
            jar.clone(),
            "--cookie".to_string(),
            jar,
            url.to_string(),
            "--output".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    fn download_atomic(
        &self,
        program: &Path,
        destination: &Path,
        args_for: impl Fn(&Path) -> Vec<String>,
    ) -> Result<(), GraceError> {
        let parent = destination
            .parent()
            .ok_or_else(|| GraceError::Filesystem("invalid destination path".to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".grace-sync")
            .tempfile_in(parent)
            .map_err(|err| GraceError::Filesystem(err.to_string()))?;
        run_with_retry(
            program,
            &args_for(temp.path()),
            self.settings.timeout,
            self.settings.retry,
        )?;
        if destination.exists() {
            fs::remove_file(destination).map_err(|err| GraceError::Filesystem(err.to_string()))?;
        }
        temp.persist(destination)
            .map_err(|err| GraceError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl Transfer for SystemTransfer {
    fn fetch_listing(&self, url: &str, destination: &Path) -> Result<(), GraceError> {
        let wget = Self::require(&self.wget, "wget")?;
        self.download_atomic(&wget, destination, |output| self.listing_args(url, output))
    }

    fn fetch_object(&self, url: &str, destination: &Path) -> Result<(), GraceError> {
        let curl = Self::require(&self.curl, "curl")?;
        self.download_atomic(&curl, destination, |output| self.object_args(url, output))
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
