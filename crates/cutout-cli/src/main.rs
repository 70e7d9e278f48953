//! cutout-cli: Remove an image's background from the command line.
//!
//! Runs the same upload gate, workflow, and border matte as the web
//! app on a local file and writes the result as PNG.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin cutout-cli -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use cutout_core::{
    BorderMatte, FileDescriptor, MatteConfig, MemoryReferences, OutputFormat, RunOutcome,
    SourceFile, ToolConfig, Transform, UploadGate, Workflow, mime_type_for_name, run_transform,
};
use tracing_subscriber::EnvFilter;

/// Remove the background from a JPG, PNG or WEBP image.
#[derive(Parser)]
#[command(name = "cutout-cli", version)]
struct Cli {
    /// Path to the input image (JPG, PNG, WEBP).
    image_path: PathBuf,

    /// Where to write the PNG. Defaults to `<name>-no-bg.png` next to
    /// the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Colour distance from the backdrop still treated as background.
    #[arg(long, default_value_t = MatteConfig::DEFAULT_TOLERANCE)]
    tolerance: f32,

    /// Keep a hard cut edge instead of feathering it.
    #[arg(long)]
    no_feather: bool,

    /// Full tool configuration as JSON (overrides the individual flags).
    #[arg(long)]
    config_json: Option<String>,
}

/// Build a [`ToolConfig`] from CLI arguments.
///
/// If `--config-json` is provided, it is parsed directly and the matte
/// flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<ToolConfig, String> {
    if let Some(ref json) = cli.config_json {
        return ToolConfig::from_json(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let config = ToolConfig {
        matte: MatteConfig {
            tolerance: cli.tolerance,
            feather: !cli.no_feather,
        },
        ..ToolConfig::default()
    };
    config
        .validate()
        .map_err(|e| format!("Invalid options: {e}"))?;
    Ok(config)
}

/// [`BorderMatte`] that also logs every tenth percent of progress.
struct LoggedMatte(BorderMatte);

impl Transform for LoggedMatte {
    type Error = <BorderMatte as Transform>::Error;

    async fn run(
        &self,
        input: &[u8],
        output: OutputFormat,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Vec<u8>, Self::Error> {
        let mut last_decile = None;
        self.0
            .run(input, output, &mut |current, total| {
                progress(current, total);
                let decile = (total > 0).then(|| current.saturating_mul(10) / total);
                if decile != last_decile {
                    last_decile = decile;
                    tracing::info!("{current}/{total}");
                }
            })
            .await
    }
}

/// Read `path` into a [`SourceFile`], typing it from its extension.
fn read_source(path: &Path) -> Result<SourceFile, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = mime_type_for_name(&name).unwrap_or_default();
    let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    Ok(SourceFile::new(FileDescriptor::new(name, size, mime_type), bytes))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let source = match read_source(&cli.image_path) {
        Ok(source) => source,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let gate = UploadGate::new(&config);
    if let Err(e) = gate.check(source.descriptor()) {
        eprintln!("{}: {e}", cli.image_path.display());
        return ExitCode::FAILURE;
    }

    tracing::info!(
        image = %cli.image_path.display(),
        bytes = source.descriptor().size,
        tolerance = config.matte.tolerance,
        feather = config.matte.feather,
        "removing background"
    );

    let workflow = RefCell::new(Workflow::new(MemoryReferences::new(), &config));
    workflow.borrow_mut().accept_file(source);

    let matte = LoggedMatte(BorderMatte::new(config.matte));
    let outcome = run_transform(&workflow, &matte).await;

    let workflow = workflow.into_inner();
    if outcome != RunOutcome::Done {
        eprintln!(
            "{}",
            workflow.error().unwrap_or(ToolConfig::DEFAULT_FAILURE_MESSAGE)
        );
        return ExitCode::FAILURE;
    }

    let download = match workflow.download() {
        Ok(download) => download,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let output_path = cli.output.clone().unwrap_or_else(|| {
        cli.image_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&download.filename)
    });

    match std::fs::write(&output_path, download.bytes) {
        Ok(()) => {
            println!("{}", output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error writing {}: {e}", output_path.display());
            ExitCode::FAILURE
        }
    }
}
