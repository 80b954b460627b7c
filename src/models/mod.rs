pub mod lexicon;

use serde::Serialize;

use crate::pipeline::batch::Batch;

#[derive(Clone, Debug, PartialEq)]
pub struct Hypothesis {
    pub tokens: Vec<String>,
    /// Log-probability of the whole hypothesis.
    pub score: f64,
}

impl Hypothesis {
    pub fn new(tokens: Vec<String>, score: f64) -> Self {
        Self { tokens, score }
    }
}

/// Hypotheses for one input, best first.
pub type HypothesisList = Vec<Hypothesis>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TranslationResult {
    /// One list per input record, in batch order.
    pub hypotheses: Vec<HypothesisList>,
    /// One score per input record; only present when references were supplied.
    pub reference_scores: Option<Vec<f64>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accelerator(u32),
}

impl Device {
    /// Negative ordinals mean "no accelerator".
    pub fn from_ordinal(gpu: Option<i32>) -> Self {
        match gpu {
            Some(n) if n >= 0 => Self::Accelerator(n as u32),
            _ => Self::Cpu,
        }
    }
}

/// Decoding settings handed to a backend when it is loaded.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    pub beam_size: usize,
    pub max_sent_length: usize,
    pub n_best: usize,
    pub replace_unk: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            beam_size: 5,
            max_sent_length: 100,
            n_best: 1,
            replace_unk: false,
        }
    }
}

/// A sequence decoder the batch driver can run.
///
/// `translate` is synchronous; every input record must get at least one
/// hypothesis. Trace recording is opt-in: after `enable_trace_recording`,
/// each `translate` call leaves one trace behind for `take_trace`.
pub trait Translator {
    type Trace: Serialize;

    fn translate(&mut self, batch: &Batch) -> anyhow::Result<TranslationResult>;

    /// Whether the target vocabulary is lowercased.
    fn target_lowercase(&self) -> bool;

    fn enable_trace_recording(&mut self);

    fn take_trace(&mut self) -> Option<Self::Trace>;
}
