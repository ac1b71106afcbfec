use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV: &str = "TRELLISRC";
const RC_FILE: &str = ".trellisrc";
const MAX_INCLUDE_DEPTH: usize = 8;

const DEFAULTS: [(&str, &str); 5] = [
  ("data.location", "~/.trellis"),
  (
    "api.base_url",
    "http://127.0.0.1:8000"
  ),
  ("api.timeout", "10"),
  ("replay.interval", "30"),
  ("color", "on")
];

/// Flat `key = value` settings from
/// the rc file chain, layered over
/// built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting(&'a str, &'a str)
}

fn parse_rc_line(
  raw: &str
) -> Option<RcLine<'_>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();

  if line.is_empty() {
    return Some(RcLine::Blank);
  }
  if let Some(target) =
    line.strip_prefix("include ")
  {
    return Some(RcLine::Include(
      target.trim()
    ));
  }

  let (key, value) =
    line.split_once('=')?;
  Some(RcLine::Setting(
    key.trim(),
    value.trim()
  ))
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    };

    match rc_file(rc_override)? {
      | Some(path) => {
        info!(rc = %path.display(), "loading trellisrc");
        cfg.read_rc(&path, 0)?;
      }
      | None => {
        debug!(
          "no trellisrc; using defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Later entries win. A leading
  /// `rc.` on the key is dropped.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = match key
        .strip_prefix("rc.")
      {
        | Some(stripped) => {
          stripped.to_string()
        }
        | None => key
      };
      debug!(key = %key, value = %value, "applying override");
      self.map.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u64>().map_err(
          |err| {
            anyhow!(
              "invalid {key} value \
               {v:?}: {err}"
            )
          }
        )
      })
      .transpose()
  }

  fn read_rc(
    &mut self,
    path: &Path,
    depth: usize
  ) -> anyhow::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
      return Err(anyhow!(
        "rc includes nested deeper \
         than {MAX_INCLUDE_DEPTH} at {}",
        path.display()
      ));
    }

    let path = expand_tilde(path);
    let text = fs::read_to_string(
      &path
    )
    .with_context(|| {
      format!(
        "failed to read {}",
        path.display()
      )
    })?;
    self.loaded_files.push(path.clone());

    let base_dir = path
      .parent()
      .unwrap_or_else(|| Path::new("."))
      .to_path_buf();

    for (idx, raw) in
      text.lines().enumerate()
    {
      let parsed = parse_rc_line(raw)
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {raw}",
            path.display(),
            idx + 1
          )
        })?;

      match parsed {
        | RcLine::Blank => {}
        | RcLine::Include(target) => {
          if target.is_empty() {
            return Err(anyhow!(
              "empty include at {}:{}",
              path.display(),
              idx + 1
            ));
          }
          let include = base_dir
            .join(expand_tilde(
              Path::new(target)
            ));
          if include.exists() {
            self.read_rc(
              &include,
              depth + 1
            )?;
          } else {
            warn!(include = %include.display(), "include file does not exist; skipping");
          }
        }
        | RcLine::Setting(key, value) => {
          trace!(key, value, "rc setting");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
      }
    }

    Ok(())
  }
}

/// Where the local store lives:
/// `--data`, then `data.location`.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    cfg.get("data.location")
  ) {
    | (Some(path), _) => {
      path.to_path_buf()
    }
    | (None, Some(location)) => {
      expand_tilde(Path::new(&location))
    }
    | (None, None) => {
      home()?.join(".trellis")
    }
  };

  fs::create_dir_all(&dir)
    .with_context(|| {
      format!(
        "failed to create {}",
        dir.display()
      )
    })?;
  Ok(dir)
}

fn rc_file(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  match std::env::var(RC_ENV) {
    | Ok(value) if value == "/dev/null" => {
      Ok(None)
    }
    | Ok(value) => {
      Ok(Some(PathBuf::from(value)))
    }
    | Err(_) => {
      let candidate =
        home()?.join(RC_FILE);
      Ok(candidate
        .exists()
        .then_some(candidate))
    }
  }
}

fn home() -> anyhow::Result<PathBuf> {
  dirs::home_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine home directory"
    )
  })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
