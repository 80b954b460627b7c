use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{locate_config, resolve_relative, AppConfig, DEFAULT_CONFIG_FILE};
use crate::error::{DriverError, DriverResult};
use crate::models::{DecodeOptions, Device};
use crate::pipeline::driver::DriverOptions;

pub const DEFAULT_OUTPUT: &str = "pred.txt";
pub const DEFAULT_BEAM_SIZE: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 30;
pub const DEFAULT_MAX_SENT_LENGTH: usize = 100;
pub const DEFAULT_SEED: i64 = 3435;

/// Values given on the command line. `None` defers to the config file.
#[derive(Clone, Debug, Default)]
pub struct RunOverrides {
    pub config: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub src: Option<PathBuf>,
    pub tgt: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub beam_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_sent_length: Option<usize>,
    pub n_best: Option<usize>,
    pub replace_unk: bool,
    pub verbose: bool,
    pub dump_beam: Option<String>,
    pub gpu: Option<i32>,
    pub seed: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub config_path: Option<PathBuf>,
    pub model: PathBuf,
    pub src: PathBuf,
    pub tgt: Option<PathBuf>,
    pub output: PathBuf,
    pub beam_size: usize,
    pub batch_size: usize,
    pub max_sent_length: usize,
    pub n_best: usize,
    pub replace_unk: bool,
    pub verbose: bool,
    pub dump_beam: Option<PathBuf>,
    pub device: Device,
    pub seed: Option<u64>,
}

impl RunConfig {
    /// Locates and loads the config file (if any), then layers `overrides` on top.
    pub fn resolve(overrides: RunOverrides) -> anyhow::Result<Self> {
        let located = locate_config(overrides.config.clone());
        let file_cfg = match located.as_ref() {
            Some(l) => l.load()?,
            None => AppConfig::default(),
        };
        let cfg_path = located.map(|l| l.path);
        Self::from_parts(&file_cfg, cfg_path.as_deref(), overrides).context("resolve run config")
    }

    pub fn from_parts(
        file_cfg: &AppConfig,
        cfg_path: Option<&Path>,
        overrides: RunOverrides,
    ) -> DriverResult<Self> {
        let t = &file_cfg.translate;
        let cfg_anchor = cfg_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let from_file = |p: &Option<PathBuf>| p.as_deref().map(|p| resolve_relative(&cfg_anchor, p));

        let model = overrides
            .model
            .or_else(|| from_file(&t.model))
            .ok_or_else(|| DriverError::invalid_config("missing model path (-m/--model)"))?;
        let src = overrides
            .src
            .or_else(|| from_file(&t.src))
            .ok_or_else(|| DriverError::invalid_config("missing source path (-s/--src)"))?;
        let tgt = overrides.tgt.or_else(|| from_file(&t.tgt));
        let output = overrides
            .output
            .or_else(|| from_file(&t.output))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        // An empty destination disables tracing; it must not be anchored first.
        let dump_beam = match overrides.dump_beam {
            Some(s) => Some(s).filter(|s| !s.is_empty()).map(PathBuf::from),
            None => t
                .dump_beam
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| resolve_relative(&cfg_anchor, Path::new(s))),
        };

        let seed = overrides.seed.or(t.seed).unwrap_or(DEFAULT_SEED);

        let cfg = Self {
            config_path: cfg_path.map(Path::to_path_buf),
            model,
            src,
            tgt,
            output,
            beam_size: overrides
                .beam_size
                .or(t.beam_size)
                .unwrap_or(DEFAULT_BEAM_SIZE),
            batch_size: overrides
                .batch_size
                .or(t.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_sent_length: overrides
                .max_sent_length
                .or(t.max_sent_length)
                .unwrap_or(DEFAULT_MAX_SENT_LENGTH),
            n_best: overrides.n_best.or(t.n_best).unwrap_or(1),
            replace_unk: overrides.replace_unk || t.replace_unk.unwrap_or(false),
            verbose: overrides.verbose || t.verbose.unwrap_or(false),
            dump_beam,
            device: Device::from_ordinal(overrides.gpu.or(t.gpu)),
            seed: u64::try_from(seed).ok(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> DriverResult<()> {
        if self.batch_size == 0 {
            return Err(DriverError::invalid_config("batch_size must be at least 1"));
        }
        if self.beam_size == 0 {
            return Err(DriverError::invalid_config("beam_size must be at least 1"));
        }
        if self.max_sent_length == 0 {
            return Err(DriverError::invalid_config("max_sent_length must be at least 1"));
        }
        if self.n_best == 0 || self.n_best > self.beam_size {
            return Err(DriverError::invalid_config(format!(
                "n_best must be between 1 and beam_size ({}), got {}",
                self.beam_size, self.n_best
            )));
        }
        Ok(())
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            batch_size: self.batch_size,
            n_best: self.n_best,
            verbose: self.verbose,
            dump_beam: self.dump_beam.clone(),
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            beam_size: self.beam_size,
            max_sent_length: self.max_sent_length,
            n_best: self.n_best,
            replace_unk: self.replace_unk,
        }
    }
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILE);

    let lexicon_path = dir.join("sample-lexicon.toml");
    if !lexicon_path.exists() || force {
        std::fs::write(&lexicon_path, SAMPLE_LEXICON_TOML)
            .with_context(|| format!("write sample lexicon: {}", lexicon_path.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[translate]
# Lexicon model (relative paths resolve against this file's directory).
model = "sample-lexicon.toml"

# Source sentences, one per line. Optional line-aligned reference file.
# src = "input.txt"
# tgt = "reference.txt"
output = "pred.txt"

beam_size = 5
batch_size = 30
max_sent_length = 100
n_best = 1

# Copy unknown source tokens instead of emitting <unk>.
replace_unk = false
verbose = false

# Write the per-batch beam search trace here ("" disables it).
dump_beam = ""

# Accelerator ordinal (-1 = none) and random seed (negative = unset).
gpu = -1
seed = 3435
"#;

const SAMPLE_LEXICON_TOML: &str = r#"# Lexicon model: each source token is rewritten by one of its entries.
lowercase = true
unk_logprob = -10.0

[[entry]]
source = "hello"
target = "bonjour"
logprob = -0.1

[[entry]]
source = "hello"
target = "salut"
logprob = -1.2

[[entry]]
source = "world"
target = "monde"
logprob = -0.2

[[entry]]
source = "the"
target = "le"
logprob = -0.7

[[entry]]
source = "the"
target = "la"
logprob = -0.9

[[entry]]
source = "the"
target = ""
logprob = -3.0
"#;
