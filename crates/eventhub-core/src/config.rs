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

const RC_ENV_VAR: &str = "EVENTHUBRC";

const DEFAULTS: [(&str, &str); 6] = [
  ("api.url", "http://localhost:4000"),
  ("data.location", "~/.eventhub"),
  ("default.command", "calendar"),
  ("color", "on"),
  ("confirmation", "on"),
  ("timezone", "")
];

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  /// Defaults, then the rc file found
  /// via `--eventhubrc`, `EVENTHUBRC`
  /// or `~/.eventhubrc`.
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override,
      std::env::var(RC_ENV_VAR).ok()
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading eventhubrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no eventhubrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
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
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// Like [`Config::get`], with empty
  /// values treated as unset.
  pub fn get_nonempty(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .map
      .get(key)
      .map(|v| v.trim())
      .filter(|v| !v.is_empty())
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

  pub fn api_url(&self) -> String {
    self
      .get_nonempty("api.url")
      .unwrap_or(DEFAULTS[0].1)
      .trim_end_matches('/')
      .to_string()
  }

  /// Sorted by key.
  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    let mut entries =
      self.map.iter().collect::<Vec<_>>();
    entries.sort();
    entries.into_iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path) {
      warn!(file = %path.display(), "rc file already loaded; skipping include cycle");
      return Ok(());
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map_or_else(
        || PathBuf::from("."),
        Path::to_path_buf
      );

    for (index, raw_line) in
      text.lines().enumerate()
    {
      let line_no = index + 1;
      match classify_line(raw_line) {
        | RcLine::Blank => {}
        | RcLine::Include(target) => {
          let include_path =
            resolve_include_path(
              &base_dir, target
            )?;
          if !include_path.exists() {
            warn!(include = %include_path.display(), line = line_no, "include file does not exist; skipping");
            continue;
          }
          debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_no,
            "processing include"
          );
          self.load_file(&include_path)?;
        }
        | RcLine::Setting(key, value) => {
          trace!(key, value, "loaded config key");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | RcLine::Invalid => {
          return Err(anyhow!(
            "invalid config line \
             {}:{line_no}: {raw_line}",
            path.display()
          ));
        }
      }
    }

    Ok(())
  }
}

/// One line of an rc file, comments
/// already removed.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting(&'a str, &'a str),
  Invalid
}

fn classify_line(raw: &str) -> RcLine<'_> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();

  if line.is_empty() {
    return RcLine::Blank;
  }
  if let Some(target) =
    line.strip_prefix("include ")
  {
    return RcLine::Include(
      target.trim()
    );
  }

  match line.split_once('=') {
    | Some((key, value))
      if !key.trim().is_empty() =>
    {
      RcLine::Setting(
        key.trim(),
        value.trim()
      )
    }
    | _ => RcLine::Invalid
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get_nonempty("data.location")
  {
    expand_tilde(Path::new(cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path, env_value
))]
fn resolve_rc_path(
  override_path: Option<&Path>,
  env_value: Option<String>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Some(rc_env) = env_value {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping \
       ~/.eventhubrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".eventhubrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".eventhub"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
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

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    classify_line,
    resolve_rc_path
  };

  #[test]
  fn defaults_point_at_local_backend()
  {
    let cfg = Config::default();
    assert_eq!(
      cfg.api_url(),
      "http://localhost:4000"
    );
    assert_eq!(
      cfg.get("default.command")
        .as_deref(),
      Some("calendar")
    );
    assert_eq!(
      cfg.get_bool("confirmation"),
      Some(true)
    );
    assert_eq!(
      cfg.get_nonempty("timezone"),
      None
    );
  }

  #[test]
  fn rc_file_with_include_and_comments()
  {
    let temp =
      tempdir().expect("tempdir");
    let extra =
      temp.path().join("extra.rc");
    fs::write(
      &extra,
      "timezone = Africa/Accra\n"
    )
    .expect("write include");
    let rc =
      temp.path().join("eventhubrc");
    fs::write(
      &rc,
      "# campus backend\napi.url = \
       http://events.test/  # trailing\n\
       confirmation=off\ninclude \
       extra.rc\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load rc");
    assert_eq!(
      cfg.api_url(),
      "http://events.test"
    );
    assert_eq!(
      cfg.get_bool("confirmation"),
      Some(false)
    );
    assert_eq!(
      cfg.get_nonempty("timezone"),
      Some("Africa/Accra")
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let rc =
      temp.path().join("eventhubrc");
    fs::write(&rc, "color on\n")
      .expect("write rc");
    assert!(Config::load(Some(rc.as_path())).is_err());
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "rc.color".to_string(),
      "off".to_string()
    )]);
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
  }

  #[test]
  fn dev_null_disables_rc_lookup() {
    assert_eq!(
      resolve_rc_path(
        None,
        Some("/dev/null".to_string())
      )
      .expect("resolve"),
      None
    );
    assert_eq!(
      resolve_rc_path(
        Some(Path::new("/tmp/custom.rc")),
        Some("/dev/null".to_string())
      )
      .expect("resolve")
      .as_deref(),
      Some(Path::new("/tmp/custom.rc"))
    );
  }

  #[test]
  fn classifies_rc_lines() {
    assert_eq!(
      classify_line("  # note"),
      RcLine::Blank
    );
    assert_eq!(
      classify_line("include ~/x.rc"),
      RcLine::Include("~/x.rc")
    );
    assert_eq!(
      classify_line("color = off # dim"),
      RcLine::Setting("color", "off")
    );
    assert_eq!(
      classify_line("= off"),
      RcLine::Invalid
    );
  }
}
