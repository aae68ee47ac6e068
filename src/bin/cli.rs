// m4b2oga - M4B Audiobook to OGA Converter
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::Context;
use clap::Parser;
use m4b2oga::audio::Codec;
use m4b2oga::{ConfigOverrides, ExtractionReport, Extractor, Settings};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "m4b2oga")]
#[command(about = "Convert M4B audiobooks to OGA with cue sheet, cover and info sidecars", long_about = None)]
struct Cli {
    /// M4B files to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write outputs here instead of next to each input
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Audio codec
    #[arg(long)]
    codec: Option<Codec>,

    /// Target bitrate in kbps
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe binary
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let overrides = ConfigOverrides {
        output_dir: cli.output_dir,
        ffmpeg: cli.ffmpeg,
        ffprobe: cli.ffprobe,
        codec: cli.codec,
        bitrate_kbps: cli.bitrate,
    };

    let settings = Settings::load(cli.config.as_deref(), overrides)
        .await
        .context("Failed to load settings")?;
    log::debug!("settings: {:?}", settings);

    let extractor = Extractor::from_settings(&settings);
    let summary = extractor.process_all(&cli.inputs, print_result).await;

    if summary.processed() > 1 {
        log::info!(
            "{} of {} inputs converted",
            summary.reports.len(),
            summary.processed()
        );
    }
    Ok(summary.is_success())
}

fn print_result(input: &Path, result: &m4b2oga::Result<ExtractionReport>) {
    match result {
        Ok(report) => {
            println!("{}:", input.display());
            for outcome in &report.outcomes {
                println!("  {:<6} {}", outcome.kind, outcome.status);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", input.display(), e.user_message());
            if e.is_tool_error() {
                eprintln!("  run with --debug to see the FFmpeg command line");
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
