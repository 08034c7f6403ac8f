//! Story Sandbox CLI
//!
//! Commands: export, scan, imports, assemble, decode, templates
//! Outputs JSON to stdout, logs to stderr
//! Exit code follows the error class of a failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use story_sandbox_core::{
    decode_parameters, scan, ConfigError, Endpoints, ExportError, ExportOptions, ExportPipeline,
    LaunchAction, Notification, TemplateKind, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "story-sandbox-cli")]
#[command(about = "Story Sandbox CLI - export a rendered story as a sandbox project")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API token; overrides `apiToken` in the options file
    #[arg(long, env = "CSB_API_TOKEN", hide_env_values = true, global = true)]
    api_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available templates
    Templates,

    /// Print the free component identifiers of a story
    Scan {
        /// Story source file
        #[arg(short, long)]
        story: PathBuf,
    },

    /// Print the resolved import block
    Imports {
        #[arg(short, long)]
        story: PathBuf,

        /// Options file (JSON)
        #[arg(short, long)]
        options: PathBuf,
    },

    /// Print the assembled file manifest
    Assemble {
        #[arg(short, long)]
        story: PathBuf,

        #[arg(short, long)]
        options: PathBuf,
    },

    /// Export a story and print the launch action
    Export {
        #[arg(short, long)]
        story: PathBuf,

        #[arg(short, long)]
        options: PathBuf,

        /// Also write an auto-submitting HTML form here
        #[arg(long)]
        form_out: Option<PathBuf>,
    },

    /// Decode a define-endpoint parameters token
    Decode {
        /// The `parameters` value
        token: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn emit<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(ExportError::from(e)),
    }
}

fn fail(err: ExportError) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": err.to_string(),
    });
    println!("{output}");
    ExitCode::from(err.exit_code())
}

async fn read_story(path: &Path) -> Result<String, ExportError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Invalid(format!("cannot read {}: {e}", path.display())).into())
}

fn load_options(path: &Path, api_token: Option<&str>) -> Result<ExportOptions, ExportError> {
    let options = ExportOptions::load(path)?;
    Ok(match api_token {
        Some(token) => options.with_api_token(token),
        None => options,
    })
}

async fn run(cli: Cli) -> Result<ExitCode, ExportError> {
    let pipeline = ExportPipeline::new(Endpoints::from_env());
    let token = cli.api_token.as_deref();

    let code = match cli.command {
        Commands::Templates => {
            let templates: Vec<_> = TemplateKind::ALL
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name(),
                        "activeFile": t.active_file(),
                        "files": t.paths(),
                        "dependencies": t.default_dependencies(),
                    })
                })
                .collect();
            emit(&templates)
        }

        Commands::Scan { story } => {
            let source = read_story(&story).await?;
            emit(&scan(&source)?)
        }

        Commands::Imports { story, options } => {
            let source = read_story(&story).await?;
            let options = load_options(&options, token)?;
            let imports = pipeline.resolve(&options, &source)?;
            print!("{imports}");
            ExitCode::SUCCESS
        }

        Commands::Assemble { story, options } => {
            let source = read_story(&story).await?;
            let options = load_options(&options, token)?;
            emit(&pipeline.build_manifest(&options, &source).await?)
        }

        Commands::Export {
            story,
            options,
            form_out,
        } => {
            let source = read_story(&story).await?;
            let options = load_options(&options, token)?;
            let notifier = |n: Notification| {
                if let Ok(json) = serde_json::to_string(&n) {
                    eprintln!("{json}");
                }
            };
            let action = pipeline.export(&options, Some(&source), &notifier).await?;

            let html = action.as_ref().and_then(LaunchAction::form_html);
            if let (Some(path), Some(html)) = (form_out, html) {
                tokio::fs::write(&path, html).await.map_err(|e| {
                    ConfigError::Invalid(format!("cannot write {}: {e}", path.display()))
                })?;
            }
            emit(&serde_json::json!({
                "success": true,
                "engineVersion": ENGINE_VERSION,
                "action": action,
            }))
        }

        Commands::Decode { token } => emit(&decode_parameters(&token)?),
    };
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => fail(e),
    }
}
