mod acquisition;
mod double_buffer;
mod frame;
mod settings;
mod simulate;
mod smooth;
mod source;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;

use acquisition::{LinkStats, LogSink, Pipeline, peak_bin};
use settings::{AppSettings, RunSettings, default_settings_path, parse_marker};
use source::{SourceChoice, open_source};
use ui::ScopeApp;

/// Live plot of float batches streamed over a serial link.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port to read from (e.g. /dev/ttyACM0 or COM3)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate for the serial port
    #[arg(short, long)]
    baud: Option<u32>,

    /// Use the built-in spectrum simulator instead of a serial port
    #[arg(long, conflicts_with_all = ["port", "replay"])]
    simulate: bool,

    /// Replay a captured byte stream from a file
    #[arg(long, value_name = "FILE", conflicts_with = "port")]
    replay: Option<PathBuf>,

    /// Log batches instead of opening a window
    #[arg(long)]
    headless: bool,

    /// Stop after this many decoded batches (headless only)
    #[arg(long, requires = "headless")]
    max_batches: Option<u64>,

    /// Number of float values per batch
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    batch_len: Option<u16>,

    /// Frame start marker, hex (0xAA) or decimal
    #[arg(long, value_parser = marker_arg)]
    marker: Option<u8>,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn marker_arg(value: &str) -> Result<u8, String> {
    parse_marker(value).ok_or_else(|| format!("'{value}' is not a byte value"))
}

impl Args {
    /// Settings for this run: `stored` with the command-line overrides on top.
    fn effective(&self, stored: &AppSettings) -> AppSettings {
        let mut settings = stored.clone();
        self.apply(&mut settings);
        settings
    }

    fn apply(&self, settings: &mut AppSettings) {
        if let Some(port) = &self.port {
            settings.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(len) = self.batch_len {
            settings.batch_len = len as usize;
        }
        if let Some(marker) = self.marker {
            settings.marker = marker;
        }
    }

    fn source_choice(&self, settings: &AppSettings) -> SourceChoice {
        if self.simulate {
            SourceChoice::Simulated
        } else if let Some(path) = &self.replay {
            SourceChoice::Replay(path.clone())
        } else if settings.port.is_some() {
            SourceChoice::Serial
        } else {
            SourceChoice::Simulated
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings_path = args.config.clone().unwrap_or_else(default_settings_path);
    let stored = AppSettings::load(&settings_path);
    let settings = args.effective(&stored);
    let choice = args.source_choice(&settings);

    if args.headless {
        return match run_headless(&settings, &choice, args.max_batches) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    let options = eframe::NativeOptions::default();
    let result = eframe::run_native(
        "Batch Scope",
        options,
        Box::new(move |cc| {
            let run = RunSettings::new(settings_path, stored, settings);
            Box::new(ScopeApp::new(cc, run, choice))
        }),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Window failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_headless(
    settings: &AppSettings,
    choice: &SourceChoice,
    max_batches: Option<u64>,
) -> Result<(), source::SourceError> {
    let mut source = open_source(choice, settings)?;
    let format = settings.frame_format();
    log::info!(
        "Reading {} (marker 0x{:02X}, {} values per batch)",
        source.describe(),
        format.marker,
        format.batch_len
    );

    let stop = Arc::new(AtomicBool::new(false));
    let (mut pipeline, view) = Pipeline::new(format, settings.poll_interval());
    let mut sink = LogSink::new(settings.bin_width_hz, max_batches, Arc::clone(&stop));
    let stats = LinkStats::default();
    let totals = pipeline.run(source.as_mut(), &mut sink, &stop, &stats)?;
    log::info!(
        "Done: {} batches, {} incomplete, {} bytes discarded",
        totals.decoded,
        totals.incomplete,
        totals.discarded_bytes
    );
    let last = view.active_view();
    if let Some((bin, magnitude)) = peak_bin(&last.values) {
        log::info!(
            "Last batch #{} peaked at bin {bin} with {magnitude:.2}",
            last.generation
        );
    }
    Ok(())
}
