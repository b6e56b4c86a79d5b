// webarchive-singlefile: convert .webarchive / .mhtml captures into single HTML files

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use webarchive_singlefile::{ConvertConfig, Converter, RenderOutput, discover_inputs};

const ABOUT: &str = "Converts Safari .webarchive bundles and MHTML snapshots into \
self-contained HTML documents. Every image, stylesheet, script, font and frame the \
page references is inlined as a data URI. Bundles are rendered in a local Chromium \
through a capturing proxy first, so resources loaded by scripts are kept as well.";

/// Shells pass this through unexpanded when nothing matches
const DEFAULT_PATTERN: &str = "*.webarchive";

#[derive(Debug, Parser)]
#[command(name = "webarchive-singlefile", version, about = "Convert web archives into self-contained HTML")]
struct Cli {
    #[arg(short, long, help = "Log relay traffic and resolution details")]
    verbose: bool,
    #[arg(long, help = "Print a description of this tool and exit")]
    about: bool,
    #[arg(long, help = "Rewrite the stored document without rendering it")]
    no_render: bool,
    #[arg(long, help = "Take an MHTML snapshot of the rendered page instead of its markup")]
    snapshot: bool,
    #[arg(long, help = "Show the browser window while rendering")]
    headed: bool,
    #[arg(value_name = "FILE", help = "Inputs; defaults to every archive in the current directory")]
    inputs: Vec<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn collect_inputs(given: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let explicit: Vec<PathBuf> = given
        .into_iter()
        .filter(|p| p.as_os_str() != DEFAULT_PATTERN)
        .collect();
    let inputs = if explicit.is_empty() {
        discover_inputs(Path::new("."))?
    } else {
        explicit
    };
    if inputs.is_empty() {
        bail!("no input file given");
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.about {
        println!("{ABOUT}");
        return ExitCode::SUCCESS;
    }
    init_logging(cli.verbose);

    let config = ConvertConfig::builder()
        .render(!cli.no_render)
        .render_output(if cli.snapshot {
            RenderOutput::Snapshot
        } else {
            RenderOutput::Document
        })
        .headless(!cli.headed)
        .verbose(cli.verbose)
        .build();
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let inputs = match collect_inputs(cli.inputs) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let converter = Converter::new(config);
    let mut failed = 0usize;
    for input in &inputs {
        info!("process {}", input.display());
        if let Err(e) = converter.convert_file(input).await {
            error!("{e}");
            failed += 1;
        }
    }

    if failed > 0 {
        error!("{failed} of {} inputs failed", inputs.len());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
