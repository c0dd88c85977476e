use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command-line arguments with positional overrides taken out.
#[derive(Debug, Clone)]
pub struct ArgSplit {
    pub clap_args: Vec<OsString>,
    pub overrides: Vec<KeyVal>,
}

/// One configuration override, from `--rc key=value` or a positional
/// `rc.key=value` / `rc.key:value` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl KeyVal {
    fn new(key: &str, value: &str) -> anyhow::Result<Self> {
        let key = key.trim();
        let key = key.strip_prefix("rc.").unwrap_or(key);
        if key.is_empty() {
            return Err(anyhow!("override is missing a key"));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }

    /// `rc.key=value` or `rc.key:value`; anything else is not an override.
    pub fn parse_positional(token: &str) -> Option<Self> {
        let rest = token.strip_prefix("rc.")?;
        let (key, value) = rest.split_once(['=', ':'])?;
        Self::new(key, value).ok()
    }
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Self::new(key, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "waypoint",
    version,
    about = "Progress through the week, month, school year and program, plus a milestone countdown"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Compute as of this instant instead of the clock, e.g. `2025-10-01 08:00` or `-3d`.
    #[arg(long = "now", allow_hyphen_values = true)]
    pub now: Option<String>,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Print the effective configuration as TOML and exit.
    #[arg(long = "show-config")]
    pub show_config: bool,
}

/// Log level for this crate: `-q` warn, `-qq` error, `-v` info, `-vv` debug,
/// `-vvv` trace. Quiet wins over verbose.
pub fn default_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    }
}

/// Starts stderr logging. `RUST_LOG` replaces the flag-derived filter. Other
/// crates stay at warn unless `-qq` lowers everything to error.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = default_level(verbose, quiet);
    let others = if level == "error" { "error" } else { "warn" };
    let directives = format!("{others},waypoint_core={level}");

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing already initialised");
    }

    Ok(())
}

/// Separates positional overrides from the arguments clap parses. The
/// program name is always kept.
#[tracing::instrument(skip_all)]
pub fn split_overrides(raw: &[OsString]) -> ArgSplit {
    let mut split = ArgSplit {
        clap_args: Vec::with_capacity(raw.len()),
        overrides: Vec::new(),
    };

    for (position, arg) in raw.iter().enumerate() {
        let parsed = (position > 0)
            .then(|| arg.to_str().and_then(KeyVal::parse_positional))
            .flatten();
        match parsed {
            Some(kv) => {
                debug!(key = %kv.key, value = %kv.value, "positional override");
                split.overrides.push(kv);
            }
            None => split.clap_args.push(arg.clone()),
        }
    }

    split
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{GlobalCli, KeyVal, OutputFormat, default_level, split_overrides};

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    fn kv(key: &str, value: &str) -> KeyVal {
        KeyVal {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn splits_positional_overrides() {
        let split = split_overrides(&args(&[
            "waypoint",
            "rc.bar_width=12",
            "-v",
            "rc.labels.week:Týden",
            "rc.nothing",
            "rc.=5",
            "--now",
            "2025-10-01 08:00",
        ]));

        assert_eq!(
            split.overrides,
            vec![kv("bar_width", "12"), kv("labels.week", "Týden")]
        );
        assert_eq!(
            split.clap_args,
            args(&[
                "waypoint",
                "-v",
                "rc.nothing",
                "rc.=5",
                "--now",
                "2025-10-01 08:00"
            ])
        );
    }

    #[test]
    fn program_name_is_never_an_override() {
        let split = split_overrides(&args(&["rc.color=off"]));
        assert!(split.overrides.is_empty());
        assert_eq!(split.clap_args, args(&["rc.color=off"]));
    }

    #[test]
    fn flag_overrides_keep_the_first_equals() {
        let parsed: KeyVal = "labels.week = Week=days".parse().expect("parse");
        assert_eq!(parsed, kv("labels.week", "Week=days"));

        let prefixed: KeyVal = "rc.color=off".parse().expect("parse");
        assert_eq!(prefixed, kv("color", "off"));

        assert!("=off".parse::<KeyVal>().is_err());
    }

    #[test]
    fn verbosity_ladder() {
        assert_eq!(default_level(0, 0), "warn");
        assert_eq!(default_level(1, 0), "info");
        assert_eq!(default_level(2, 0), "debug");
        assert_eq!(default_level(5, 0), "trace");
        assert_eq!(default_level(0, 1), "warn");
        assert_eq!(default_level(3, 2), "error");
    }

    #[test]
    fn parses_flags() {
        let cli = GlobalCli::parse_from(args(&[
            "waypoint",
            "-vv",
            "--rc",
            "color=off",
            "--now",
            "-2d",
            "--format",
            "json",
        ]));

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides, vec![kv("color", "off")]);
        assert_eq!(cli.now.as_deref(), Some("-2d"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(!cli.show_config);
    }

    #[test]
    fn rejects_malformed_rc_flag() {
        assert!(GlobalCli::try_parse_from(args(&["waypoint", "--rc", "color"])).is_err());
    }
}
