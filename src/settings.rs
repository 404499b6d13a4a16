use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use autocrop_engine::{EngineOptions, Mode, OptionsError, PreventChangeBias, RatioList};
use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use thiserror::Error;

use crate::cli::{CliArgs, CliSources, OutputFormat};

const PROJECT_CONFIG_FILE: &str = "autocrop.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    output: Option<String>,
    format: Option<String>,
    quiet: Option<bool>,
    engine: Option<EngineOptions>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Log(PathBuf),
    Mock,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub input: InputSource,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub quiet: bool,
    pub engine: EngineOptions,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value '{value}' for '{field}'{}", describe_origin(.path.as_deref()))]
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },

    #[error("config file {} does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("no event log given; pass a path or --mock")]
    MissingInput,

    #[error(transparent)]
    Options(#[from] OptionsError),
}

fn describe_origin(path: Option<&Path>) -> String {
    path.map(|path| format!(" in {}", path.display()))
        .unwrap_or_default()
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    for candidate in [project_config_path(), default_config_path()]
        .into_iter()
        .flatten()
    {
        if candidate.exists() {
            let config = read_config(&candidate)?;
            return Ok((config, Some(candidate)));
        }
    }

    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        output: file_output,
        format: file_format,
        quiet: file_quiet,
        engine: file_engine,
    } = file;

    let input = match (&cli.input, cli.mock) {
        (_, true) => InputSource::Mock,
        (Some(path), false) => InputSource::Log(expand_pathbuf(path.clone())),
        (None, false) => return Err(ConfigError::MissingInput),
    };

    let output = match &cli.output {
        Some(path) => Some(expand_pathbuf(path.clone())),
        None => normalize_string(file_output)
            .map(|value| resolve_path_from_config(&value, config_dir.as_deref())),
    };

    let mut format = cli.format;
    if !sources.format_from_cli {
        if let Some(value) = normalize_string(file_format) {
            format = parse_output_format(&value, config_path.as_ref())?;
        }
    }

    let mut quiet = cli.quiet;
    if !sources.quiet_from_cli {
        quiet = file_quiet.unwrap_or(quiet);
    }

    let mut engine = file_engine.unwrap_or_default();
    if sources.mode_from_cli {
        engine.mode = Mode::try_from(cli.mode)?;
    }
    if let Some(value) = cli.start_delay {
        engine.start_delay = value;
    }
    if let Some(value) = cli.fast_change_timer {
        engine.fast_change_timer = value;
    }
    if let Some(value) = cli.new_known_ratio_timer {
        engine.new_known_ratio_timer = value;
    }
    if let Some(value) = cli.new_fallback_timer {
        engine.new_fallback_timer = value;
    }
    if let Some(value) = normalize_string(cli.ratios.clone()) {
        engine.ratios = value
            .parse::<RatioList>()
            .map_err(|err| ConfigError::InvalidValue {
                path: None,
                field: "ratios",
                value: err.0,
            })?;
    }
    if let Some(value) = cli.detect_limit {
        engine.detect_limit = value;
    }
    if let Some(value) = cli.prevent_change_timer {
        engine.prevent_change_timer = value;
    }
    if let Some(value) = normalize_string(cli.prevent_change_bias.clone()) {
        engine.prevent_change_bias =
            value
                .parse::<PreventChangeBias>()
                .map_err(|_| ConfigError::InvalidValue {
                    path: None,
                    field: "prevent_change_bias",
                    value,
                })?;
    }
    engine.validate()?;

    Ok(EffectiveSettings {
        input,
        output,
        format,
        quiet,
        engine,
        config_path,
    })
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "autocrop", "autocrop")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir()
        .ok()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: &str, base: Option<&Path>) -> PathBuf {
    let expanded = expand_home_path(value);
    match base {
        Some(base) if !expanded.is_absolute() => base.join(expanded),
        _ => expanded,
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

fn parse_output_format(value: &str, path: Option<&PathBuf>) -> Result<OutputFormat, ConfigError> {
    OutputFormat::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field: "format",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    fn parse(args: &[&str]) -> (CliArgs, CliSources) {
        let matches = CliArgs::command()
            .try_get_matches_from(std::iter::once("autocrop").chain(args.iter().copied()))
            .unwrap();
        let cli = CliArgs::from_arg_matches(&matches).unwrap();
        let sources = CliSources::from_matches(&matches);
        (cli, sources)
    }

    fn file(contents: &str) -> FileConfig {
        toml::from_str(contents).unwrap()
    }

    #[test]
    fn defaults_without_config() {
        let (cli, sources) = parse(&["session.jsonl"]);
        let settings = merge(&cli, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.input, InputSource::Log(PathBuf::from("session.jsonl")));
        assert_eq!(settings.format, OutputFormat::Text);
        assert!(!settings.quiet);
        assert_eq!(settings.engine, EngineOptions::default());
    }

    #[test]
    fn file_values_apply_when_flags_are_absent() {
        let (cli, sources) = parse(&["--mock"]);
        let config = file(
            r#"
            format = "json"
            quiet = true
            output = "crops.jsonl"

            [engine]
            mode = 3
            prevent_change_timer = 4.0
            "#,
        );
        let settings =
            merge(&cli, &sources, config, Some(PathBuf::from("/etc/autocrop/autocrop.toml")))
                .unwrap();
        assert_eq!(settings.input, InputSource::Mock);
        assert_eq!(settings.format, OutputFormat::Json);
        assert!(settings.quiet);
        assert_eq!(
            settings.output,
            Some(PathBuf::from("/etc/autocrop/crops.jsonl"))
        );
        assert_eq!(settings.engine.mode, Mode::AutoManual);
        assert_eq!(settings.engine.prevent_change_timer, 4.0);
    }

    #[test]
    fn command_line_wins_over_file() {
        let (cli, sources) = parse(&[
            "--format",
            "text",
            "--mode",
            "1",
            "--new-known-ratio-timer",
            "2.5",
            "--prevent-change-bias",
            "any",
            "log.jsonl",
        ]);
        let config = file(
            r#"
            format = "json"

            [engine]
            mode = 3
            new_known_ratio_timer = 8.0
            "#,
        );
        let settings = merge(&cli, &sources, config, None).unwrap();
        assert_eq!(settings.format, OutputFormat::Text);
        assert_eq!(settings.engine.mode, Mode::OnDemand);
        assert_eq!(settings.engine.new_known_ratio_timer, 2.5);
        assert_eq!(settings.engine.prevent_change_bias, PreventChangeBias::Any);
    }

    #[test]
    fn invalid_values_are_reported() {
        let (cli, sources) = parse(&["log.jsonl"]);
        let err = merge(
            &cli,
            &sources,
            file(r#"format = "yaml""#),
            Some(PathBuf::from("autocrop.toml")),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "format", .. }
        ));

        let (cli, sources) = parse(&["--ratios", "2.39 wide", "log.jsonl"]);
        let err = merge(&cli, &sources, FileConfig::default(), None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "ratios", .. }
        ));

        let (cli, sources) = parse(&["--fast-change-timer=-1", "log.jsonl"]);
        let err = merge(&cli, &sources, FileConfig::default(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Options(_)));
    }

    #[test]
    fn input_is_required() {
        let (cli, sources) = parse(&[]);
        let err = merge(&cli, &sources, FileConfig::default(), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingInput));
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));

        let present = dir.path().join("autocrop.toml");
        fs::write(&present, "[engine]\ndetect_limit = 30\n").unwrap();
        let (config, path) = load_config(Some(&present)).unwrap();
        assert_eq!(path, Some(present));
        assert_eq!(config.engine.map(|engine| engine.detect_limit), Some(30));
    }
}
