//! CLI mode for vod - command-line interface for downloading stream ranges.

mod progress;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    AppConfig, Batch, BatchRequest, Error, FfmpegMuxer, MediaMetadata, Playlist,
    PlaylistClient, SessionStatsBuilder, StatusSink, build_http_client, format_clock, parse_clock,
};

use progress::{SpinnerStatus, print_summary};

/// Options collected from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub urls: Vec<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub output: Option<PathBuf>,
    pub workers: Option<usize>,
    pub rate_limit: Option<u32>,
    pub keep: bool,
}

/// Outcome of argument parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(CliArgs),
    Help,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> crate::Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| Error::Config(format!("{flag} requires a value")))
}

fn number<T: std::str::FromStr>(text: &str, flag: &str) -> crate::Result<T> {
    text.parse()
        .map_err(|_| Error::Config(format!("{flag}: invalid number {text:?}")))
}

fn clock(text: &str, flag: &str) -> crate::Result<f64> {
    parse_clock(text).ok_or_else(|| Error::Config(format!("{flag}: invalid time {text:?}")))
}

/// Parses command-line arguments (without the program name).
///
/// # Errors
///
/// Returns [`Error::Config`] for unknown options or malformed values.
pub fn parse_args(args: &[String]) -> crate::Result<Command> {
    let mut parsed = CliArgs::default();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-s" | "--start" => {
                i += 1;
                parsed.start = Some(clock(value(args, i, flag)?, flag)?);
            }
            "-e" | "--end" => {
                i += 1;
                parsed.end = Some(clock(value(args, i, flag)?, flag)?);
            }
            "-t" | "--title" => {
                i += 1;
                parsed.title = Some(value(args, i, flag)?.to_string());
            }
            "-a" | "--artist" => {
                i += 1;
                parsed.artist = Some(value(args, i, flag)?.to_string());
            }
            "-o" | "--output" => {
                i += 1;
                parsed.output = Some(PathBuf::from(value(args, i, flag)?));
            }
            "-w" | "--workers" => {
                i += 1;
                parsed.workers = Some(number(value(args, i, flag)?, flag)?);
            }
            "-r" | "--rate-limit" => {
                i += 1;
                parsed.rate_limit = Some(number(value(args, i, flag)?, flag)?);
            }
            "-k" | "--keep" => parsed.keep = true,
            "-h" | "--help" => return Ok(Command::Help),
            arg if !arg.starts_with('-') => parsed.urls.push(arg.to_string()),
            _ => return Err(Error::Config(format!("unknown option: {flag}"))),
        }
        i += 1;
    }

    if parsed.output.is_some() && parsed.urls.len() > 1 {
        return Err(Error::Config(
            "--output can only be used with a single playlist".to_string(),
        ));
    }
    Ok(Command::Run(parsed))
}

pub fn print_usage() {
    eprintln!("Usage: vod [OPTIONS] <PLAYLIST_URL>...");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <PLAYLIST_URL>       HLS media or master playlist");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --start <T>      Range start (seconds or [HH:]MM:SS)");
    eprintln!("  -e, --end <T>        Range end (seconds or [HH:]MM:SS)");
    eprintln!("  -t, --title <S>      Title metadata and default file name");
    eprintln!("  -a, --artist <S>     Artist metadata");
    eprintln!("  -o, --output <FILE>  Output file (single playlist only)");
    eprintln!("  -w, --workers <N>    Concurrent segment downloads");
    eprintln!("  -r, --rate-limit <B> Throughput cap in bytes per second");
    eprintln!("  -k, --keep           Keep downloaded segments after joining");
    eprintln!("  -h, --help           Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG             Log verbosity (default: warn)");
}

/// Applies command-line overrides on top of the loaded configuration.
fn apply_overrides(mut config: AppConfig, args: &CliArgs) -> crate::Result<AppConfig> {
    if let Some(workers) = args.workers {
        config.download = config.download.with_workers(workers);
    }
    if args.rate_limit.is_some() {
        config.download = config.download.with_rate_limit(args.rate_limit);
    }
    if args.keep {
        config.download = config.download.with_keep_segments(true);
    }
    config.download.validate()?;
    Ok(config)
}

/// Output file for a playlist when `--output` is not given.
fn default_target(config: &AppConfig, args: &CliArgs, playlist: &Playlist) -> PathBuf {
    let stem = args.title.clone().unwrap_or_else(|| {
        playlist
            .base_url()
            .path_segments()
            .and_then(|mut parts| parts.rfind(|p| !p.is_empty()).map(ToString::to_string))
            .unwrap_or_else(|| "video".to_string())
    });
    let stem: String = stem
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    config.paths.output_dir.join(format!("{stem}.mp4"))
}

fn describe_range(args: &CliArgs) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let show = |t: Option<f64>, open: &str| {
        t.map_or_else(|| open.to_string(), |t| format_clock(t.max(0.0) as u64))
    };
    format!("{} - {}", show(args.start, "start"), show(args.end, "end"))
}

/// Runs the CLI with the process arguments.
///
/// # Errors
///
/// Returns the first batch failure, or a configuration error.
pub async fn run() -> crate::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&args)? {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Run(args) if args.urls.is_empty() => {
            print_usage();
            return Err(Error::Config("no playlist URL given".to_string()));
        }
        Command::Run(args) => args,
    };

    let config = apply_overrides(AppConfig::load()?, &args)?;
    let http = build_http_client(&config.download)?;
    let client = PlaylistClient::new(http.clone());
    let status = Arc::new(SpinnerStatus::new());
    let muxer = Arc::new(FfmpegMuxer::from_config(&config.muxer));
    let batch = Batch::new(http, config.clone(), muxer, status.clone());

    let metadata = MediaMetadata::new(
        args.title.clone().unwrap_or_default(),
        args.artist.clone().unwrap_or_default(),
    );

    let mut builder = SessionStatsBuilder::new();
    let mut first_error = None;

    for url in &args.urls {
        let result = async {
            let playlist = client.fetch(url).await?;
            let target = args
                .output
                .clone()
                .unwrap_or_else(|| default_target(&config, &args, &playlist));
            println!(
                "{url} [{}] -> {}",
                describe_range(&args),
                target.display()
            );
            let request = BatchRequest::new(playlist, target)
                .with_range(args.start, args.end)
                .with_metadata(metadata.clone());
            batch.run(&request).await
        }
        .await;

        match result {
            Ok(stats) => builder.add_batch(&stats),
            Err(e) => {
                status.message(&format!("Error: {e}"));
                builder.add_failure();
                first_error.get_or_insert(e);
            }
        }
    }

    status.finish();
    print_summary(&builder.build());

    first_error.map_or(Ok(()), Err)
}
