//! Worker Seam - Running Engine Jobs
//!
//! The engine is an opaque program: inputs go in as command-line flags,
//! outputs come back as files. Its exit status is the only other signal.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::config::{Config, Scripts};
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Import,
    Generate,
    Update,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Import => "import",
            JobKind::Generate => "generate",
            JobKind::Update => "update",
        };
        f.write_str(name)
    }
}

/// One engine invocation: which script, with which `--flag value` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: JobKind,
    pub flags: Vec<(String, String)>,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self { kind, flags: vec![] }
    }

    /// Appends `--name value`. `name` is used as given.
    pub fn flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.push((name.into(), value.into()));
        self
    }

    /// Flattened `--name value` arguments in insertion order.
    pub fn args(&self) -> Vec<String> {
        self.flags
            .iter()
            .flat_map(|(name, value)| [format!("--{name}"), value.clone()])
            .collect()
    }
}

/// How a finished job exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl JobStatus {
    pub const SUCCESS: JobStatus = JobStatus { code: Some(0) };

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for JobStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Runs a job to completion, blocking the caller.
///
/// `Err` means the job could not run at all (launch failure, timeout); a
/// process that ran and exited non-zero is an `Ok` status.
pub trait Worker: Send + Sync {
    fn run(&self, job: &Job) -> Result<JobStatus>;
}

impl<W: Worker + ?Sized> Worker for std::sync::Arc<W> {
    fn run(&self, job: &Job) -> Result<JobStatus> {
        (**self).run(job)
    }
}

/// Runs jobs as `<engine> --background --python <script> -- <flags...>`.
#[derive(Debug, Clone)]
pub struct EngineWorker {
    engine: PathBuf,
    scripts: Scripts,
    timeout: Option<Duration>,
}

impl EngineWorker {
    /// `scripts` are used as given, without resolving against a root.
    pub fn new(engine: impl Into<PathBuf>, scripts: Scripts) -> Self {
        Self {
            engine: engine.into(),
            scripts,
            timeout: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let scripts = Scripts {
            generate: config.script(JobKind::Generate),
            import: config.script(JobKind::Import),
            update: config.script(JobKind::Update),
        };
        Self::new(config.engine.clone(), scripts).with_timeout(config.job_timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn script(&self, kind: JobKind) -> &PathBuf {
        match kind {
            JobKind::Generate => &self.scripts.generate,
            JobKind::Import => &self.scripts.import,
            JobKind::Update => &self.scripts.update,
        }
    }

    /// Full argument vector after the executable.
    pub fn command_args(&self, job: &Job) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--background".into(),
            "--python".into(),
            self.script(job.kind).clone().into_os_string(),
            "--".into(),
        ];
        args.extend(job.args().into_iter().map(OsString::from));
        args
    }

    fn wait(&self, child: &mut Child, kind: JobKind) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(job = %kind, pid = child.id(), ?timeout, "engine timed out, killing");
                child.kill()?;
                child.wait()?;
                return Err(Error::JobFailed(format!("{kind} job timed out after {timeout:?}")));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Worker for EngineWorker {
    fn run(&self, job: &Job) -> Result<JobStatus> {
        let started = Instant::now();
        let mut child = Command::new(&self.engine)
            .args(self.command_args(job))
            .spawn()
            .map_err(|e| {
                Error::JobFailed(format!(
                    "could not launch {} for {} job: {e}",
                    self.engine.display(),
                    job.kind
                ))
            })?;

        info!(job = %job.kind, pid = child.id(), flags = ?job.flags, "engine started");
        let status = JobStatus::from(self.wait(&mut child, job.kind)?);
        info!(
            job = %job.kind,
            code = ?status.code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine exited"
        );
        Ok(status)
    }
}

static BEFORE_CAPITALIZED_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new("(.)([A-Z][a-z]+)").expect("valid regex"));
static LOWER_UPPER_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new("([a-z0-9])([A-Z])").expect("valid regex"));

/// camelCase field name to dash-case flag name: `mediaType` → `media-type`.
pub fn dasherize(key: &str) -> String {
    let split_words = BEFORE_CAPITALIZED_WORD.replace_all(key, "${1}-${2}");
    LOWER_UPPER_BOUNDARY
        .replace_all(&split_words, "${1}-${2}")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripts() -> Scripts {
        Scripts {
            generate: PathBuf::from("gen.py"),
            import: PathBuf::from("imp.py"),
            update: PathBuf::from("upd.py"),
        }
    }

    #[test]
    fn test_dasherize() {
        assert_eq!(dasherize("mediaType"), "media-type");
        assert_eq!(dasherize("outputWidth"), "output-width");
        assert_eq!(dasherize("url"), "url");
        assert_eq!(dasherize("HTTPServerPort"), "http-server-port");
        assert_eq!(dasherize("getHTTPResponseCode"), "get-http-response-code");
        assert_eq!(dasherize("frame2Start"), "frame2-start");
        assert_eq!(dasherize("already-dashed"), "already-dashed");
        assert_eq!(dasherize(""), "");
    }

    #[test]
    fn test_command_args_contract() {
        let worker = EngineWorker::new("blender", scripts());
        let job = Job::new(JobKind::Import)
            .flag("url", "http://example.com/a.obj")
            .flag("id", "20240101-x");

        let args: Vec<_> = worker
            .command_args(&job)
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();

        assert_eq!(
            args,
            [
                "--background",
                "--python",
                "imp.py",
                "--",
                "--url",
                "http://example.com/a.obj",
                "--id",
                "20240101-x",
            ]
        );
    }

    #[test]
    fn test_missing_engine_is_job_failure() {
        let worker = EngineWorker::new("/nonexistent/elmyra-engine", scripts());
        let err = worker.run(&Job::new(JobKind::Generate)).unwrap_err();
        assert!(matches!(err, Error::JobFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_reported() {
        let ok = EngineWorker::new("true", scripts());
        assert!(ok.run(&Job::new(JobKind::Generate)).unwrap().success());

        let failing = EngineWorker::new("false", scripts());
        let status = failing.run(&Job::new(JobKind::Generate)).unwrap();
        assert!(!status.success());
        assert_eq!(status.code, Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn test_timed_out_engine_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let engine = dir.path().join("slow-engine");
        std::fs::write(&engine, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();

        let worker =
            EngineWorker::new(&engine, scripts()).with_timeout(Some(Duration::from_millis(300)));
        let started = Instant::now();
        let result = worker.run(&Job::new(JobKind::Generate));

        assert!(matches!(result, Err(Error::JobFailed(_))), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
