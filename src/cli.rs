use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub format_from_cli: bool,
    pub mode_from_cli: bool,
    pub quiet_from_cli: bool,
}

impl CliSources {
    pub(crate) fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            format_from_cli: value_from_cli(matches, "format"),
            mode_from_cli: value_from_cli(matches, "mode"),
            quiet_from_cli: value_from_cli(matches, "quiet"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "autocrop",
    about = "Replay black-bar detections and print the crop changes they lead to",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Write commands to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Command output format
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Replay the built-in synthetic session instead of an event log
    #[arg(long = "mock", conflicts_with = "input")]
    pub mock: bool,

    /// Hide the progress bar
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// 0 disabled, 1 on-demand, 2 single-start, 3 auto-manual, 4 auto-start
    #[arg(
        long = "mode",
        default_value_t = 4,
        value_parser = clap::value_parser!(u8).range(0..=4)
    )]
    pub mode: u8,

    /// Ignore ticks before this playback position on automatic starts (seconds)
    #[arg(long = "start-delay", value_name = "SECONDS")]
    pub start_delay: Option<f64>,

    /// Re-observation needed to re-apply a trusted crop (seconds)
    #[arg(long = "fast-change-timer", value_name = "SECONDS")]
    pub fast_change_timer: Option<f64>,

    /// Observation needed to trust a known-ratio crop (seconds)
    #[arg(long = "new-known-ratio-timer", value_name = "SECONDS")]
    pub new_known_ratio_timer: Option<f64>,

    /// Observation needed to trust any other crop; 0 disables (seconds)
    #[arg(long = "new-fallback-timer", value_name = "SECONDS")]
    pub new_fallback_timer: Option<f64>,

    /// Known aspect ratios, space separated, decimal or a/b
    #[arg(long = "ratios", value_name = "LIST")]
    pub ratios: Option<String>,

    /// Maximum detector threshold
    #[arg(long = "detect-limit", value_parser = clap::value_parser!(u32))]
    pub detect_limit: Option<u32>,

    /// Cooldown after a crop change; 0 disables (seconds)
    #[arg(long = "prevent-change-timer", value_name = "SECONDS")]
    pub prevent_change_timer: Option<f64>,

    /// Changes still allowed during the cooldown: any, larger-only, smaller-only
    #[arg(long = "prevent-change-bias", value_name = "BIAS")]
    pub prevent_change_bias: Option<String>,

    /// Event log in JSON lines
    pub input: Option<PathBuf>,
}
