//! Elmyra CLI - store inspection and job runs without the HTTP layer
//!
//! Outputs JSON to stdout.
//! Returns non-zero when the operation fails.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use elmyra_core::{logging, App, Config, EngineWorker, Error};

#[derive(Parser)]
#[command(name = "elmyra-cli")]
#[command(about = "Elmyra CLI - versioned visualization store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store root (overrides the config file)
    #[arg(long)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all visualizations with their versions, newest first
    Visualizations,

    /// List versions of a visualization, oldest first
    Versions { visualization: String },

    /// Print the latest version of a visualization
    Latest { visualization: String },

    /// Resolve an artifact to a file
    Resolve {
        visualization: String,
        /// Version id or `latest`
        version: String,
        /// Export format, `thumbnail` or `blend`
        format: String,
    },

    /// Run a generate job
    Generate {
        /// camelCase parameters as key=value
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Run an update job
    Update {
        visualization: String,

        /// Scene file to merge in first (deleted afterwards)
        #[arg(long)]
        blend: Option<PathBuf>,
    },

    /// Import a scene into a new session
    Import { url: String },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    if let Some(root) = cli.root {
        config.root = root;
    }
    config.log.filter = "warn".to_string();
    if let Err(e) = logging::init(&config.log) {
        eprintln!("{e}");
    }

    let app = App::new(EngineWorker::from_config(&config), &config);

    let output = match cli.command {
        Commands::Visualizations => app
            .store()
            .list_all_visualizations()
            .map(|all| {
                let all: Vec<_> = all
                    .into_iter()
                    .map(|v| serde_json::json!({ "name": v.name, "versions": v.versions }))
                    .collect();
                serde_json::json!({ "visualizations": all })
            }),
        Commands::Versions { visualization } => app
            .store()
            .list_versions(&visualization)
            .map(|versions| serde_json::json!({ "versions": versions })),
        Commands::Latest { visualization } => app
            .store()
            .latest_version(&visualization)
            .map(|version| serde_json::json!({ "version": version })),
        Commands::Resolve {
            visualization,
            version,
            format,
        } => app
            .resolver
            .resolve(&visualization, &version, &format)
            .map(|artifact| serde_json::json!({ "artifact": artifact })),
        Commands::Generate { params } => {
            let params: BTreeMap<_, _> = params.into_iter().collect();
            match app.dispatcher.run_generate(&params) {
                Ok(report) if !report.success => {
                    println!("{}", serde_json::json!({ "success": false, "report": report }));
                    return ExitCode::from(2);
                }
                other => other.map(|report| serde_json::json!({ "report": report })),
            }
        }
        Commands::Update {
            visualization,
            blend,
        } => app
            .dispatcher
            .run_update(&visualization, blend)
            .map(|version| serde_json::json!({ "version": version })),
        Commands::Import { url } => app
            .sessions()
            .create_session(&url)
            .map(|id| serde_json::json!({ "importId": id })),
    };

    match output {
        Ok(mut value) => {
            if let Some(obj) = value.as_object_mut() {
                obj.insert("success".into(), true.into());
            }
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn fail(e: &Error) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": e.to_string(),
    });
    println!("{output}");
    ExitCode::FAILURE
}
