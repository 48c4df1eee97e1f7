use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(default_config_path())
    }

    /// Defaults, then the rc file at `config_path` (if any), then the environment.
    pub fn load_from(config_path: PathBuf) -> Self {
        let mut map = default_map();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if let Some((k, v)) = parse_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Defaults overlaid with `KEY=VALUE` lines from `text`; the environment is not consulted.
    pub fn from_rc_text(text: &str) -> Self {
        let mut map = default_map();
        for line in text.lines() {
            if let Some((k, v)) = parse_line(line) {
                map.insert(k, v);
            }
        }
        Self { inner: map, config_path: PathBuf::new() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// Seconds as a duration; `none`, `off`, empty or unparsable values yield `None`.
    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get(key).and_then(|v| parse_secs(&v))
    }

    pub fn python(&self) -> Option<PathBuf> {
        self.get("REPL_PYTHON")
            .filter(|v| !v.is_empty() && v != "auto")
            .map(PathBuf::from)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.get_duration_secs("REPL_DEFAULT_TIMEOUT")
    }

    pub fn channel_grace(&self) -> Duration {
        Duration::from_millis(self.get_u64("REPL_CHANNEL_GRACE_MS").unwrap_or(2000))
    }
}

/// Parse a seconds value such as `2`, `0.5` or `none`.
pub fn parse_secs(v: &str) -> Option<Duration> {
    let v = v.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("off") {
        return None;
    }
    v.parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    line.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "REPL_PYTHON",
        "REPL_DEFAULT_TIMEOUT",
        "REPL_CHANNEL_GRACE_MS",
        "REPL_SESSION",
        "REPL_LOG_LEVEL",
        "REPL_LOG_JSON",
        "REPL_FAULT_COLOR",
    ];

    KEYS.contains(&k) || k.starts_with("REPL_")
}

fn default_config_path() -> PathBuf {
    config_dir().join(".replrc")
}

fn config_dir() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| Path::new("~/.config").to_path_buf());
    base.join("repl_runner")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert("REPL_PYTHON".into(), "auto".into());
    m.insert("REPL_DEFAULT_TIMEOUT".into(), "none".into());
    m.insert("REPL_CHANNEL_GRACE_MS".into(), "2000".into());
    m.insert("REPL_SESSION".into(), "shared".into());
    m.insert("REPL_LOG_LEVEL".into(), "warn".into());
    m.insert("REPL_LOG_JSON".into(), "false".into());
    m.insert("REPL_FAULT_COLOR".into(), "red".into());

    m
}
