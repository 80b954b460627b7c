use std::fmt;

use crate::models::TranslationResult;
use crate::pipeline::batch::Batch;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoreTotals {
    pub score: f64,
    pub words: usize,
}

impl ScoreTotals {
    pub fn add(&mut self, score: f64, words: usize) {
        self.score += score;
        self.words += words;
    }

    pub fn report(&self) -> ScoreReport {
        if self.words == 0 {
            return ScoreReport::Undefined;
        }
        let avg_score = self.score / self.words as f64;
        ScoreReport::Defined {
            avg_score,
            perplexity: (-avg_score).exp(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScoreReport {
    Defined { avg_score: f64, perplexity: f64 },
    /// No tokens were scored.
    Undefined,
}

/// Corpus-level totals for predictions and references.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AggregateStats {
    pub pred: ScoreTotals,
    pub gold: ScoreTotals,
}

impl AggregateStats {
    /// Adds one batch. `result` must already be validated against `batch`.
    pub fn add_batch(&mut self, batch: &Batch, result: &TranslationResult) {
        for hyps in &result.hypotheses {
            if let Some(top) = hyps.first() {
                self.pred.add(top.score, top.tokens.len());
            }
        }
        if let Some(gold_scores) = result.reference_scores.as_ref() {
            for (record, score) in batch.records().iter().zip(gold_scores) {
                let words = record.reference.as_ref().map_or(0, Vec::len);
                self.gold.add(*score, words);
            }
        }
    }
}

/// One summary line, e.g. `PRED AVG SCORE: -2.0000, PRED PPL: 7.3891`.
pub struct ScoreLine<'a> {
    pub name: &'a str,
    pub report: ScoreReport,
}

impl fmt::Display for ScoreLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name;
        match self.report {
            ScoreReport::Defined {
                avg_score,
                perplexity,
            } => write!(
                f,
                "{name} AVG SCORE: {avg_score:.4}, {name} PPL: {perplexity:.4}"
            ),
            ScoreReport::Undefined => write!(f, "{name} AVG SCORE: undef, {name} PPL: undef"),
        }
    }
}
