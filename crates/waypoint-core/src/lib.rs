pub mod calendar;
pub mod cli;
pub mod config;
pub mod present;
pub mod progress;
pub mod ranges;
pub mod render;

use std::ffi::OsString;
use std::fmt::Display;
use std::io::{
  self,
  IsTerminal,
  Write
};

use anyhow::Context;
use chrono::{
  DateTime,
  Local,
  TimeZone,
  Utc
};
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::cli::{
  GlobalCli,
  OutputFormat
};
use crate::config::Config;
use crate::present::Presentation;
use crate::render::TerminalSurface;

pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let stdout = io::stdout();
  let is_terminal = stdout.is_terminal();
  run_to(
    raw_args,
    stdout.lock(),
    is_terminal
  )
}

/// Runs one invocation, writing its
/// output to `out`. ANSI color is only
/// used when `is_terminal` is set.
#[tracing::instrument(skip_all)]
pub fn run_to<W: Write>(
  raw_args: Vec<OsString>,
  mut out: W,
  is_terminal: bool
) -> anyhow::Result<()> {
  let split =
    cli::split_overrides(&raw_args);
  let cli =
    GlobalCli::parse_from(split.clap_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting waypoint"
  );
  debug!(?split.overrides, "positional overrides");

  let mut cfg =
    Config::load(cli.config.as_deref())?;
  cfg.apply_overrides(
    split
      .overrides
      .into_iter()
      .chain(cli.rc_overrides.iter().cloned())
      .map(|kv| (kv.key, kv.value))
  )?;

  if cli.show_config {
    let text = toml::to_string_pretty(&cfg)
      .context(
        "failed to serialize config"
      )?;
    write!(out, "{text}")?;
    return Ok(());
  }

  let ansi = cfg.color && is_terminal;
  match cfg.timezone()? {
    | Some(tz) => {
      let clock =
        Utc::now().with_timezone(&tz);
      execute(
        &cfg, &cli, &tz, clock, &mut out,
        ansi
      )?
    }
    | None => {
      execute(
        &cfg,
        &cli,
        &Local,
        Local::now(),
        &mut out,
        ansi
      )?
    }
  }

  info!("done");
  Ok(())
}

/// One computation pass: resolve the
/// instant and schedule, compute, and
/// hand the result to the chosen
/// output.
fn execute<Z: TimeZone, W: Write>(
  cfg: &Config,
  cli: &GlobalCli,
  tz: &Z,
  clock: DateTime<Z>,
  out: &mut W,
  ansi: bool
) -> anyhow::Result<()>
where
  Z::Offset: Display
{
  let now = match cli.now.as_deref() {
    | Some(expr) => {
      calendar::parse_instant(
        tz, expr, clock
      )
      .context("invalid --now value")?
    }
    | None => clock
  };
  debug!(now = %now.to_rfc3339(), "computing progress");

  let schedule = cfg
    .resolve(tz)
    .context("invalid configuration")?;
  let report =
    progress::compute(&now, &schedule)?;
  let presentation =
    Presentation::from_report(
      &report,
      &cfg.labels
    );

  match cli.format {
    | OutputFormat::Text => {
      let mut surface =
        TerminalSurface::new(cfg);
      let skipped =
        presentation.apply(&mut surface);
      debug!(skipped, "applied presentation");
      surface.write_to(out, ansi)
    }
    | OutputFormat::Json => {
      render::write_json(
        out,
        &now,
        &report,
        &presentation
      )
    }
  }
}
