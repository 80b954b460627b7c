use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "batch-translator.toml";
pub const CONFIG_ENV_VAR: &str = "BATCH_TRANSLATOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub translate: TranslateSection,
}

/// `[translate]` table. Every key is optional; command-line flags win.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct TranslateSection {
    #[serde(default)]
    pub model: Option<PathBuf>,
    #[serde(default)]
    pub src: Option<PathBuf>,
    #[serde(default)]
    pub tgt: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub beam_size: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub max_sent_length: Option<usize>,
    #[serde(default)]
    pub n_best: Option<usize>,
    #[serde(default)]
    pub replace_unk: Option<bool>,
    #[serde(default)]
    pub verbose: Option<bool>,

    /// Beam trace destination; an empty string disables tracing.
    #[serde(default)]
    pub dump_beam: Option<String>,

    /// Accelerator ordinal; negative means none.
    #[serde(default)]
    pub gpu: Option<i32>,
    /// Negative leaves the seed unset.
    #[serde(default)]
    pub seed: Option<i64>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

/// Where a config path came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigOrigin {
    Flag,
    EnvVar,
    Search,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocatedConfig {
    pub path: PathBuf,
    pub origin: ConfigOrigin,
}

impl LocatedConfig {
    /// Paths named by the user must exist; only a searched path may be absent.
    pub fn load(&self) -> anyhow::Result<AppConfig> {
        if !self.path.exists() {
            match self.origin {
                ConfigOrigin::Flag => {
                    anyhow::bail!("config not found: {}", self.path.display())
                }
                ConfigOrigin::EnvVar => anyhow::bail!(
                    "config not found: {} (from {CONFIG_ENV_VAR})",
                    self.path.display()
                ),
                ConfigOrigin::Search => return Ok(AppConfig::default()),
            }
        }
        load_config(&self.path)
    }
}

/// Explicit path, then the environment variable, then an upward search.
pub fn locate_config(explicit: Option<PathBuf>) -> Option<LocatedConfig> {
    let env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
    locate_config_from(explicit, env).or_else(|| {
        find_default_config(DEFAULT_CONFIG_FILE).map(|path| LocatedConfig {
            path,
            origin: ConfigOrigin::Search,
        })
    })
}

fn locate_config_from(explicit: Option<PathBuf>, env: Option<PathBuf>) -> Option<LocatedConfig> {
    let non_empty = |p: &PathBuf| !p.as_os_str().is_empty();
    if let Some(path) = explicit.filter(non_empty) {
        return Some(LocatedConfig {
            path,
            origin: ConfigOrigin::Flag,
        });
    }
    env.filter(non_empty).map(|path| LocatedConfig {
        path,
        origin: ConfigOrigin::EnvVar,
    })
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parse config: {}", path.display()))
}

pub fn parse_config(text: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(text).context("parse config toml")?;
    Ok(cfg)
}

/// Resolves `path` against the directory holding the config file.
pub fn resolve_relative(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(path)
    } else {
        path.to_path_buf()
    }
}
