//! Lexical beam-search translator.
//!
//! The model is a TOML lexicon mapping single source tokens to weighted target
//! phrases. Decoding is monotone: every source token is rewritten by exactly
//! one of its options, and hypotheses with identical output so far are
//! recombined at each step.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use super::{DecodeOptions, Device, Hypothesis, HypothesisList, TranslationResult, Translator};
use crate::pipeline::batch::Batch;

pub const UNK_TOKEN: &str = "<unk>";
const DEFAULT_UNK_LOGPROB: f64 = -10.0;

#[derive(Debug, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    lowercase: bool,
    #[serde(default = "default_unk_logprob")]
    unk_logprob: f64,
    #[serde(default)]
    entry: Vec<LexiconEntry>,
}

fn default_unk_logprob() -> f64 {
    DEFAULT_UNK_LOGPROB
}

#[derive(Clone, Debug, Deserialize)]
pub struct LexiconEntry {
    pub source: String,
    /// Whitespace-separated target phrase; empty means the token is dropped.
    pub target: String,
    pub logprob: f64,
}

#[derive(Clone, Debug, PartialEq)]
struct LexOption {
    target: Vec<String>,
    logprob: f64,
}

#[derive(Clone, Debug)]
pub struct Lexicon {
    lowercase: bool,
    unk_logprob: f64,
    /// Options per source token, best first.
    table: HashMap<String, Vec<LexOption>>,
}

impl Lexicon {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read lexicon model: {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parse lexicon model: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let file: LexiconFile = toml::from_str(text).context("parse lexicon toml")?;
        if !file.unk_logprob.is_finite() || file.unk_logprob > 0.0 {
            return Err(anyhow!(
                "unk_logprob must be a finite log-probability (<= 0), got {}",
                file.unk_logprob
            ));
        }
        let mut lex = Self {
            lowercase: file.lowercase,
            unk_logprob: file.unk_logprob,
            table: HashMap::new(),
        };
        for (i, e) in file.entry.into_iter().enumerate() {
            lex.insert(e).with_context(|| format!("lexicon entry #{}", i + 1))?;
        }
        for opts in lex.table.values_mut() {
            opts.sort_by(|a, b| b.logprob.total_cmp(&a.logprob));
        }
        Ok(lex)
    }

    fn insert(&mut self, e: LexiconEntry) -> anyhow::Result<()> {
        let source = e.source.trim();
        if source.is_empty() || source.split_whitespace().count() != 1 {
            return Err(anyhow!("source must be a single token, got {:?}", e.source));
        }
        if !e.logprob.is_finite() || e.logprob > 0.0 {
            return Err(anyhow!(
                "logprob must be a finite log-probability (<= 0), got {}",
                e.logprob
            ));
        }
        let key = self.normalize(source);
        let target: Vec<String> = e
            .target
            .split_whitespace()
            .map(|t| self.normalize(t))
            .collect();
        let opts = self.table.entry(key).or_default();
        match opts.iter_mut().find(|o| o.target == target) {
            Some(existing) => existing.logprob = existing.logprob.max(e.logprob),
            None => opts.push(LexOption {
                target,
                logprob: e.logprob,
            }),
        }
        Ok(())
    }

    pub fn lowercase(&self) -> bool {
        self.lowercase
    }

    pub fn unk_logprob(&self) -> f64 {
        self.unk_logprob
    }

    pub fn len(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn normalize(&self, token: &str) -> String {
        if self.lowercase {
            token.to_lowercase()
        } else {
            token.to_string()
        }
    }

    /// Known options for `token`, or the single unknown-word fallback.
    fn options(&self, token: &str, replace_unk: bool) -> Vec<LexOption> {
        if let Some(opts) = self.table.get(&self.normalize(token)) {
            return opts.clone();
        }
        let target = if replace_unk {
            token.to_string()
        } else {
            UNK_TOKEN.to_string()
        };
        vec![LexOption {
            target: vec![target],
            logprob: self.unk_logprob,
        }]
    }
}

/// Search trace for one batch: one entry per sentence, in batch order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchTrace {
    pub sentences: Vec<SentenceTrace>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SentenceTrace {
    pub steps: Vec<BeamStep>,
}

/// Surviving beams after consuming one source token.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BeamStep {
    /// Phrase each beam emitted at this step.
    pub tokens: Vec<String>,
    /// Index of the beam each one extended at the previous step.
    pub parents: Vec<usize>,
    /// Cumulative log-probabilities.
    pub scores: Vec<f64>,
}

#[derive(Clone, Debug)]
struct Beam {
    tokens: Vec<String>,
    score: f64,
}

struct Candidate {
    parent: usize,
    emitted: String,
    beam: Beam,
}

pub struct LexiconTranslator {
    lexicon: Lexicon,
    opts: DecodeOptions,
    trace_enabled: bool,
    last_trace: Option<BatchTrace>,
}

impl LexiconTranslator {
    pub fn new(lexicon: Lexicon, opts: DecodeOptions) -> Self {
        Self {
            lexicon,
            opts,
            trace_enabled: false,
            last_trace: None,
        }
    }

    pub fn load(path: &Path, opts: DecodeOptions) -> anyhow::Result<Self> {
        Ok(Self::new(Lexicon::load(path)?, opts))
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Lexicon decoding always runs on the CPU.
    pub fn device(&self) -> Device {
        Device::Cpu
    }

    /// Beam search over one source sentence; returns the n-best list and,
    /// when `record` is set, the per-step beams.
    fn decode(&self, source: &[String], record: bool) -> (HypothesisList, Vec<BeamStep>) {
        let beam_size = self.opts.beam_size.max(1);
        let max_len = self.opts.max_sent_length;
        let mut beams = vec![Beam {
            tokens: Vec::new(),
            score: 0.0,
        }];
        let mut steps = Vec::new();

        for token in source {
            let options = self.lexicon.options(token, self.opts.replace_unk);
            let mut cands: Vec<Candidate> = Vec::with_capacity(beams.len() * options.len());
            for (parent, beam) in beams.iter().enumerate() {
                for opt in options.iter().take(beam_size) {
                    let mut tokens = beam.tokens.clone();
                    tokens.extend(opt.target.iter().cloned());
                    tokens.truncate(max_len);
                    cands.push(Candidate {
                        parent,
                        emitted: opt.target.join(" "),
                        beam: Beam {
                            tokens,
                            score: beam.score + opt.logprob,
                        },
                    });
                }
            }
            // Stable: ties keep expansion order.
            cands.sort_by(|a, b| b.beam.score.total_cmp(&a.beam.score));
            let mut seen: HashSet<Vec<String>> = HashSet::new();
            cands.retain(|c| seen.insert(c.beam.tokens.clone()));
            cands.truncate(beam_size);

            if record {
                steps.push(BeamStep {
                    tokens: cands.iter().map(|c| c.emitted.clone()).collect(),
                    parents: cands.iter().map(|c| c.parent).collect(),
                    scores: cands.iter().map(|c| c.beam.score).collect(),
                });
            }
            beams = cands.into_iter().map(|c| c.beam).collect();
        }

        let hyps = beams
            .into_iter()
            .take(self.opts.n_best.max(1))
            .map(|b| Hypothesis::new(b.tokens, b.score))
            .collect();
        (hyps, steps)
    }

    /// Best monotone derivation of `reference` from `source`. When no
    /// derivation exists every reference token is charged as unknown.
    fn reference_score(&self, source: &[String], reference: &[String]) -> f64 {
        let m = reference.len();
        let reference: Vec<String> = reference.iter().map(|t| self.lexicon.normalize(t)).collect();
        let mut dp = vec![f64::NEG_INFINITY; m + 1];
        dp[0] = 0.0;
        for token in source {
            let options: Vec<LexOption> = self
                .lexicon
                .options(token, self.opts.replace_unk)
                .into_iter()
                .map(|o| LexOption {
                    target: o.target.iter().map(|t| self.lexicon.normalize(t)).collect(),
                    logprob: o.logprob,
                })
                .collect();
            let mut next = vec![f64::NEG_INFINITY; m + 1];
            for (j, &score) in dp.iter().enumerate() {
                if score == f64::NEG_INFINITY {
                    continue;
                }
                for opt in &options {
                    let end = j + opt.target.len();
                    if end <= m && reference[j..end] == opt.target[..] {
                        next[end] = next[end].max(score + opt.logprob);
                    }
                }
            }
            dp = next;
        }
        if dp[m].is_finite() {
            dp[m]
        } else {
            self.lexicon.unk_logprob * m as f64
        }
    }
}

impl Translator for LexiconTranslator {
    type Trace = BatchTrace;

    fn translate(&mut self, batch: &Batch) -> anyhow::Result<TranslationResult> {
        let record = self.trace_enabled;
        let mut hypotheses = Vec::with_capacity(batch.len());
        let mut sentences = Vec::new();
        for source in batch.sources() {
            let (hyps, steps) = self.decode(source, record);
            hypotheses.push(hyps);
            if record {
                sentences.push(SentenceTrace { steps });
            }
        }
        let reference_scores = batch.references().map(|refs| {
            batch
                .sources()
                .zip(refs)
                .map(|(src, gold)| self.reference_score(src, gold))
                .collect()
        });
        if record {
            self.last_trace = Some(BatchTrace { sentences });
        }
        Ok(TranslationResult {
            hypotheses,
            reference_scores,
        })
    }

    fn target_lowercase(&self) -> bool {
        self.lexicon.lowercase()
    }

    fn enable_trace_recording(&mut self) {
        self.trace_enabled = true;
    }

    fn take_trace(&mut self) -> Option<BatchTrace> {
        self.last_trace.take()
    }
}
