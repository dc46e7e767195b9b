//! Shared fixtures: a temporary store root and a scriptable fake engine.

#![allow(dead_code)] // Not every test binary uses every helper

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use elmyra_core::{App, Config, Job, JobStatus, Result, Worker};
use tempfile::TempDir;

type Behavior = Box<dyn Fn(&Job) -> Result<JobStatus> + Send + Sync>;

/// Records every job and answers with a test-provided behavior.
pub struct FakeEngine {
    behavior: Behavior,
    jobs: Mutex<Vec<Job>>,
}

impl FakeEngine {
    pub fn new(behavior: impl Fn(&Job) -> Result<JobStatus> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            behavior: Box::new(behavior),
            jobs: Mutex::new(vec![]),
        })
    }

    /// Exits with `code` without touching the filesystem.
    pub fn exiting(code: i32) -> Arc<Self> {
        Self::new(move |_| Ok(JobStatus { code: Some(code) }))
    }

    /// Writes what the real engine writes for each job kind, then exits 0.
    pub fn succeeding(imports: PathBuf) -> Arc<Self> {
        Self::new(move |job| {
            match job.kind {
                elmyra_core::JobKind::Import => {
                    let dir = imports.join(flag(job, "id").unwrap());
                    fs::create_dir_all(&dir)?;
                    fs::write(dir.join("preview.obj"), "v 0 0 0\n")?;
                }
                elmyra_core::JobKind::Update => {
                    let out = PathBuf::from(flag(job, "output").unwrap());
                    fs::write(out.join("scene.blend"), "BLENDER")?;
                    fs::write(out.join("thumbnail.png"), "PNG")?;
                    fs::write(out.join("exported.png"), "PNG")?;
                    fs::write(out.join("meta.json"), r#"{"mediaType": "still"}"#)?;
                }
                elmyra_core::JobKind::Generate => {}
            }
            Ok(JobStatus::SUCCESS)
        })
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Worker for FakeEngine {
    fn run(&self, job: &Job) -> Result<JobStatus> {
        self.jobs.lock().unwrap().push(job.clone());
        (self.behavior)(job)
    }
}

pub fn flag<'a>(job: &'a Job, name: &str) -> Option<&'a str> {
    job.flags
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Temporary store root plus the config pointing at it.
pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            root: dir.path().to_path_buf(),
            ..Config::default()
        };
        Self { dir, config }
    }

    pub fn app(&self, engine: Arc<FakeEngine>) -> App<Arc<FakeEngine>> {
        App::new(engine, &self.config)
    }

    pub fn imports(&self) -> PathBuf {
        self.config.layout().imports
    }

    pub fn visualizations(&self) -> PathBuf {
        self.config.layout().visualizations
    }

    /// Creates a committed version with the given files.
    pub fn add_version(&self, visualization: &str, version: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.visualizations().join(visualization).join(version);
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
        dir
    }
}

pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|rd| {
            rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
