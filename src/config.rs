use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Deployment version tag; changing it invalidates every cache
  pub version: String,
  /// Origin and scope of the app, e.g. `https://app.example.org/`
  pub origin: Url,
  /// App shell document, relative to `origin`
  #[serde(default = "default_shell")]
  pub shell: String,
  /// Resources fetched into the static namespace at install, relative to `origin`
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  /// External data URL that is always served network-first
  pub remote_feed: Url,
  /// Upper bound for a single network fetch. Unset waits indefinitely.
  pub fetch_timeout_secs: Option<u64>,
  #[serde(default)]
  pub precache_policy: PrecachePolicy,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

fn default_shell() -> String {
  "./index.html".to_string()
}

fn default_precache() -> Vec<String> {
  vec!["./".to_string(), "./index.html".to_string()]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Cache database (default: $XDG_DATA_HOME/shellcache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Directory for daily-rolling log files. Logs go to stderr only when unset.
  pub dir: Option<PathBuf>,
}

/// What install does when a precache fetch fails.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrecachePolicy {
  /// Any failure aborts install and nothing is stored
  #[default]
  AllOrNothing,
  /// Store what succeeded, log the rest, complete install
  Tolerant,
}

/// Validated settings for the worker, with every path resolved to an absolute URL.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub version: String,
  pub origin: Url,
  pub shell: Url,
  pub precache: Vec<Url>,
  pub remote_feed: Url,
  pub fetch_timeout: Option<Duration>,
  pub precache_policy: PrecachePolicy,
}

impl Config {
  /// Read the configuration for this run.
  ///
  /// `--config` must point at an existing file. Without it the first of
  /// [`Config::candidate_paths`] that exists is used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    if let Some(path) = explicit_path {
      if !path.exists() {
        return Err(eyre!("Config file not found: {}", path.display()));
      }
      return Self::load_from_path(path);
    }

    let candidates = Self::candidate_paths();
    match candidates.iter().find(|p| p.exists()) {
      Some(path) => Self::load_from_path(path),
      None => Err(eyre!(
        "No shellcache config found (looked in: {}). See config.example.yaml for the format.",
        candidates
          .iter()
          .map(|p| p.display().to_string())
          .collect::<Vec<_>>()
          .join(", ")
      )),
    }
  }

  /// `shellcache.yaml` in the working directory, then
  /// `shellcache/config.yaml` under the user config directory.
  fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("shellcache.yaml")];
    if let Some(dir) = dirs::config_dir() {
      paths.push(dir.join("shellcache").join("config.yaml"));
    }
    paths
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Validate and resolve into the settings the worker runs with.
  pub fn worker_config(&self) -> Result<WorkerConfig> {
    let version = self.version.trim();
    if version.is_empty() || version.contains(char::is_whitespace) {
      return Err(eyre!(
        "Invalid version tag '{}': must be non-empty without whitespace",
        self.version
      ));
    }

    if !matches!(self.origin.scheme(), "http" | "https") || self.origin.host().is_none() {
      return Err(eyre!(
        "Invalid origin '{}': must be an absolute http(s) URL",
        self.origin
      ));
    }

    // Relative paths resolve against the scope directory
    let mut origin = self.origin.clone();
    if !origin.path().ends_with('/') {
      let path = format!("{}/", origin.path());
      origin.set_path(&path);
    }

    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid resource path '{}': {}", path, e))
    };

    let shell = resolve(&self.shell)?;
    let precache = self
      .precache
      .iter()
      .map(|p| resolve(p))
      .collect::<Result<Vec<_>>>()?;

    let mut seen = BTreeSet::new();
    for url in &precache {
      if !seen.insert(url.as_str()) {
        return Err(eyre!("Precache manifest lists {} more than once", url));
      }
    }

    let fetch_timeout = match self.fetch_timeout_secs {
      Some(0) => return Err(eyre!("fetch_timeout_secs must be greater than zero")),
      Some(secs) => Some(Duration::from_secs(secs)),
      None => None,
    };

    Ok(WorkerConfig {
      version: version.to_string(),
      origin,
      shell,
      precache,
      remote_feed: self.remote_feed.clone(),
      fetch_timeout,
      precache_policy: self.precache_policy,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"
version: v1.0.0
origin: https://app.example.org/
remote_feed: https://docs.example.com/pub?output=csv
"#;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml(MINIMAL).unwrap();
    assert_eq!(config.shell, "./index.html");
    assert_eq!(config.precache, vec!["./", "./index.html"]);
    assert_eq!(config.precache_policy, PrecachePolicy::AllOrNothing);
    assert!(config.fetch_timeout_secs.is_none());
    assert!(config.cache.path.is_none());
    assert!(config.log.dir.is_none());

    let worker = config.worker_config().unwrap();
    assert_eq!(worker.shell.as_str(), "https://app.example.org/index.html");
    assert_eq!(worker.precache[0].as_str(), "https://app.example.org/");
    assert!(worker.fetch_timeout.is_none());
  }

  #[test]
  fn test_paths_resolve_inside_scope() {
    let yaml = r#"
version: v2
origin: https://example.org/tools/app
remote_feed: https://docs.example.com/feed.csv
shell: ./index.html
precache: ["./", "./manifest.json", "./icons/icon-192.png"]
fetch_timeout_secs: 15
precache_policy: tolerant
cache:
  path: /tmp/shellcache.db
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let worker = config.worker_config().unwrap();

    assert_eq!(worker.origin.as_str(), "https://example.org/tools/app/");
    assert_eq!(worker.shell.as_str(), "https://example.org/tools/app/index.html");
    assert_eq!(
      worker.precache[2].as_str(),
      "https://example.org/tools/app/icons/icon-192.png"
    );
    assert_eq!(worker.fetch_timeout, Some(Duration::from_secs(15)));
    assert_eq!(worker.precache_policy, PrecachePolicy::Tolerant);
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/shellcache.db")));
  }

  #[test]
  fn test_rejects_blank_version() {
    let yaml = MINIMAL.replace("v1.0.0", "\"  \"");
    let config = Config::from_yaml(&yaml).unwrap();
    assert!(config.worker_config().is_err());
  }

  #[test]
  fn test_rejects_non_http_origin() {
    let yaml = MINIMAL.replace("https://app.example.org/", "file:///srv/app/");
    let config = Config::from_yaml(&yaml).unwrap();
    assert!(config.worker_config().is_err());
  }

  #[test]
  fn test_rejects_duplicate_manifest_entries() {
    let yaml = format!("{}precache: [\"./index.html\", \"index.html\"]\n", MINIMAL);
    let config = Config::from_yaml(&yaml).unwrap();
    let err = config.worker_config().unwrap_err();
    assert!(err.to_string().contains("more than once"));
  }

  #[test]
  fn test_rejects_zero_timeout() {
    let yaml = format!("{}fetch_timeout_secs: 0\n", MINIMAL);
    let config = Config::from_yaml(&yaml).unwrap();
    assert!(config.worker_config().is_err());
  }

  #[test]
  fn test_missing_remote_feed_is_a_parse_error() {
    let yaml = "version: v1\norigin: https://app.example.org/\n";
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/shellcache.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_reads_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.yaml");
    std::fs::write(
      &path,
      "version: v2\norigin: https://app.example.org/\nremote_feed: https://docs.example.com/pub?output=csv\n",
    )
    .unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.version, "v2");
  }

  #[test]
  fn test_working_directory_is_searched_first() {
    let candidates = Config::candidate_paths();
    assert_eq!(candidates[0], PathBuf::from("shellcache.yaml"));
    assert!(candidates
      .iter()
      .skip(1)
      .all(|p| p.ends_with("shellcache/config.yaml")));
  }
}
