use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::TimeZone;
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  warn
};

use crate::calendar::{
  parse_timezone,
  parse_weekday_name
};
use crate::progress::{
  Milestone,
  Schedule
};
use crate::ranges::{
  DateRange,
  NamedRange,
  RangeTable
};

const CONFIG_ENV_VAR: &str =
  "WAYPOINT_CONFIG";
const TIMEZONE_ENV_VAR: &str =
  "WAYPOINT_TIMEZONE";
const CONFIG_DIR_NAME: &str =
  "waypoint";
const CONFIG_FILE_NAME: &str =
  "config.toml";

const BAR_WIDTHS:
  std::ops::RangeInclusive<usize> =
  1..=500;

#[derive(
  Debug, Clone, Deserialize, Serialize,
)]
pub struct RangeConfig {
  pub label: String,
  pub start: String,
  pub end:   String
}

#[derive(
  Debug, Clone, Deserialize, Serialize,
)]
pub struct ProgramConfig {
  pub start: String,
  pub end:   String
}

#[derive(
  Debug, Clone, Deserialize, Serialize,
)]
pub struct MilestoneConfig {
  pub year:    i32,
  /// 1-based.
  pub month:   u32,
  #[serde(default = "default_weekday")]
  pub weekday: String
}

#[derive(
  Debug, Clone, Deserialize, Serialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct Labels {
  pub week:                String,
  pub weekend:             String,
  pub month:               String,
  pub year:                String,
  pub total:               String,
  pub milestone_remaining: String,
  pub milestone_elapsed:   String
}

impl Default for Labels {
  fn default() -> Self {
    Self {
      week:                "Week".into(),
      weekend:             "Weekend"
        .into(),
      month:               "Month".into(),
      year:                "School year"
        .into(),
      total:               "Total".into(),
      milestone_remaining:
        "{days} days until the \
         milestone"
          .into(),
      milestone_elapsed:
        "Milestone passed {days} days \
         ago"
          .into()
    }
  }
}

#[derive(
  Debug, Clone, Deserialize, Serialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub timezone:     Option<String>,
  pub color:        bool,
  pub bar_width:    usize,
  pub hide:         Vec<String>,
  pub ranges:       Vec<RangeConfig>,
  pub program:      ProgramConfig,
  pub milestone:    MilestoneConfig,
  pub labels:       Labels,
  #[serde(skip)]
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let range = |label: &str,
                 start: &str,
                 end: &str| {
      RangeConfig {
        label: label.to_string(),
        start: start.to_string(),
        end:   end.to_string()
      }
    };

    Self {
      timezone:     None,
      color:        true,
      bar_width:    30,
      hide:         vec![],
      ranges:       vec![
        range(
          "2023/24",
          "2023-09-04",
          "2024-06-30"
        ),
        range(
          "2024/25",
          "2024-09-02",
          "2025-06-30"
        ),
        range(
          "2025/26",
          "2025-09-01",
          "2026-06-30"
        ),
        range(
          "2026/27",
          "2026-09-01",
          "2027-06-30"
        ),
      ],
      program:      ProgramConfig {
        start: "2023-09-04".to_string(),
        end:   "2027-06-30".to_string()
      },
      milestone:    MilestoneConfig {
        year:    2027,
        month:   5,
        weekday: default_weekday()
      },
      labels:       Labels::default(),
      loaded_files: vec![]
    }
  }
}

fn default_weekday() -> String {
  "monday".to_string()
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    match resolve_config_path(
      config_override
    )? {
      | Some(path) => {
        info!(config = %path.display(), "loading config");
        Self::load_file(&path)
      }
      | None => {
        debug!(
          "no config file found; \
           using built-in schedule"
        );
        Ok(Self::default())
      }
    }
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    toml::from_str(text)
      .context("invalid config toml")
  }

  #[tracing::instrument]
  fn load_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let text =
      fs::read_to_string(path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    let mut cfg =
      Self::from_toml_str(&text)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;
    cfg
      .loaded_files
      .push(path.to_path_buf());
    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self
        .apply_override(&key, v)
        .with_context(|| {
          format!(
            "invalid override for \
             {key}"
          )
        })?;
    }
    Ok(())
  }

  fn apply_override(
    &mut self,
    key: &str,
    value: String
  ) -> anyhow::Result<()> {
    match key {
      | "timezone" => {
        self.timezone = Some(value)
      }
      | "color" => {
        self.color = parse_bool(&value)
          .ok_or_else(|| {
            anyhow!(
              "expected a boolean, got \
               {value:?}"
            )
          })?
      }
      | "bar_width" => {
        self.bar_width = value
          .trim()
          .parse()
          .context(
            "expected a positive \
             integer"
          )?
      }
      | "program.start" => {
        self.program.start = value
      }
      | "program.end" => {
        self.program.end = value
      }
      | "milestone.year" => {
        self.milestone.year = value
          .trim()
          .parse()
          .context("expected a year")?
      }
      | "milestone.month" => {
        self.milestone.month = value
          .trim()
          .parse()
          .context(
            "expected a month number"
          )?
      }
      | "milestone.weekday" => {
        self.milestone.weekday = value
      }
      | "labels.week" => {
        self.labels.week = value
      }
      | "labels.weekend" => {
        self.labels.weekend = value
      }
      | "labels.month" => {
        self.labels.month = value
      }
      | "labels.year" => {
        self.labels.year = value
      }
      | "labels.total" => {
        self.labels.total = value
      }
      | "labels.milestone_remaining" => {
        self.labels.milestone_remaining =
          value
      }
      | "labels.milestone_elapsed" => {
        self.labels.milestone_elapsed =
          value
      }
      | "hide" => {
        self.hide = value
          .split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(str::to_string)
          .collect();
      }
      | other => {
        warn!(key = %other, "unknown override key; ignoring");
      }
    }
    Ok(())
  }

  /// The zone wall-clock computations
  /// run in. `None` means the system
  /// local zone.
  pub fn timezone(
    &self
  ) -> anyhow::Result<Option<Tz>> {
    if let Some(raw) = &self.timezone {
      return parse_timezone(
        raw, "config"
      )
      .map(Some);
    }

    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && !raw.trim().is_empty()
    {
      return parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
      .map(Some);
    }

    Ok(None)
  }

  /// Validates the static tables into
  /// a [`Schedule`] anchored in `tz`.
  #[tracing::instrument(skip_all)]
  pub fn resolve<Z: TimeZone>(
    &self,
    tz: &Z
  ) -> anyhow::Result<Schedule<Z>> {
    let mut entries =
      Vec::with_capacity(
        self.ranges.len()
      );
    for entry in &self.ranges {
      let range =
        DateRange::from_literals(
          tz,
          &entry.start,
          &entry.end
        )
        .with_context(|| {
          format!(
            "invalid range {:?}",
            entry.label
          )
        })?;
      entries.push(NamedRange {
        label: entry.label.clone(),
        range
      });
    }
    let school_years =
      RangeTable::new(entries)
        .context("invalid ranges")?;

    let program =
      DateRange::from_literals(
        tz,
        &self.program.start,
        &self.program.end
      )
      .context("invalid program")?;

    let weekday = parse_weekday_name(
      &self.milestone.weekday
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid milestone weekday: \
         {}",
        self.milestone.weekday
      )
    })?;
    let milestone =
      Milestone::first_weekday_of(
        tz,
        self.milestone.year,
        self.milestone.month,
        weekday
      )
      .context("invalid milestone")?;

    if !BAR_WIDTHS.contains(&self.bar_width)
    {
      return Err(anyhow!(
        "bar_width must be between {} \
         and {}, got {}",
        BAR_WIDTHS.start(),
        BAR_WIDTHS.end(),
        self.bar_width
      ));
    }

    debug!(
      ranges = school_years.entries().len(),
      "resolved schedule"
    );

    Ok(Schedule {
      school_years,
      program,
      milestone
    })
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(config_env) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if config_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      config_env
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    warn!(
      "cannot determine config \
       directory; using defaults"
    );
    return Ok(None);
  };
  let candidate = config_dir
    .join(CONFIG_DIR_NAME)
    .join(CONFIG_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
