//! Elmyra Core - Versioned Visualization Store
//!
//! # Ground Rules
//! 1. The filesystem is the index
//! 2. Version ids order themselves (natural sort)
//! 3. A version is visible only once committed
//! 4. One request, one engine run, no retries
//! 5. Missing artifacts are "not yet available", never a crash

pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod metadata;
pub mod resolver;
pub mod session;
pub mod store;
pub mod version;
pub mod worker;

pub use app::App;
pub use config::{Config, Layout};
pub use dispatcher::{Dispatcher, GenerateReport};
pub use error::{Error, Result};
pub use metadata::{MediaType, Metadata, VisualizationSummary};
pub use resolver::{Artifact, ArtifactResolver, Disposition};
pub use session::ImportSessions;
pub use store::{StagedVersion, VersionStore, LATEST};
pub use version::{natural_cmp, new_session_id, new_version_id, VersionPrecision};
pub use worker::{dasherize, EngineWorker, Job, JobKind, JobStatus, Worker};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
