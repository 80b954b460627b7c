use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::error::{DriverError, DriverResult};
use crate::lines::{Line, LineSource, ReferenceReader};
use crate::models::{TranslationResult, Translator};
use crate::pipeline::batch::{Batch, BatchAccumulator, InputRecord};
use crate::pipeline::emit::OutputEmitter;
use crate::pipeline::scores::{AggregateStats, ScoreLine};
use crate::pipeline::trace::BeamTraceRecorder;
use crate::progress::ConsoleProgress;
use crate::textutil::tokenize;

#[derive(Clone, Debug)]
pub struct DriverOptions {
    pub batch_size: usize,
    pub n_best: usize,
    pub verbose: bool,
    /// Beam trace destination; `None` disables tracing.
    pub dump_beam: Option<PathBuf>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            batch_size: 30,
            n_best: 1,
            verbose: false,
            dump_beam: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub sentences: usize,
    pub batches: usize,
    pub stats: AggregateStats,
    pub trace_path: Option<PathBuf>,
}

/// Mutable run state owned by the loop.
#[derive(Default)]
struct RunState {
    sentence: usize,
    batches: usize,
    stats: AggregateStats,
}

pub struct BatchDriver<T> {
    translator: T,
    opts: DriverOptions,
    progress: ConsoleProgress,
}

impl<T: Translator> BatchDriver<T> {
    pub fn new(translator: T, opts: DriverOptions, progress: ConsoleProgress) -> Self {
        Self {
            translator,
            opts,
            progress,
        }
    }

    pub fn progress(&self) -> &ConsoleProgress {
        &self.progress
    }

    pub fn into_translator(self) -> T {
        self.translator
    }

    /// Streams `source` (and `reference`, line-aligned) through the translator
    /// batch by batch, writing predictions to `result` and diagnostics plus
    /// the closing score summary to `console`.
    pub fn run<S, G, W, C>(
        &mut self,
        source: S,
        reference: Option<G>,
        result: W,
        console: C,
    ) -> DriverResult<RunSummary>
    where
        S: BufRead,
        G: BufRead,
        W: Write,
        C: Write,
    {
        if self.opts.n_best == 0 {
            return Err(DriverError::invalid_config("n_best must be at least 1"));
        }
        let mut acc = BatchAccumulator::new(self.opts.batch_size)?;
        let mut recorder = match self.opts.dump_beam.clone() {
            Some(path) => {
                let rec = BeamTraceRecorder::new(path)?;
                self.translator.enable_trace_recording();
                Some(rec)
            }
            None => None,
        };
        let has_references = reference.is_some();
        let mut references = reference.map(ReferenceReader::new);
        let mut emitter = OutputEmitter::new(
            result,
            console,
            self.opts.verbose,
            self.opts.n_best,
            self.translator.target_lowercase(),
        );
        let mut state = RunState::default();

        self.progress.info("Translation... START");
        let started = self.progress.elapsed_secs();

        let mut next_index = 0usize;
        for line in LineSource::new(source) {
            let batch = match line? {
                Line::Text(text) => {
                    next_index += 1;
                    let reference = match references.as_mut() {
                        Some(refs) => Some(tokenize(&refs.line_for(next_index)?)),
                        None => None,
                    };
                    acc.accept(InputRecord {
                        index: next_index,
                        source: tokenize(&text),
                        reference,
                    })
                }
                Line::EndOfStream => acc.flush(),
            };
            if let Some(batch) = batch {
                self.process_batch(&batch, &mut state, &mut emitter, recorder.as_mut())?;
            }
        }

        let pred = ScoreLine {
            name: "PRED",
            report: state.stats.pred.report(),
        };
        let console = emitter.console();
        let mut summary = format!("{pred}\n");
        if has_references {
            let gold = ScoreLine {
                name: "GOLD",
                report: state.stats.gold.report(),
            };
            summary.push_str(&format!("{gold}\n"));
        }
        console
            .write_all(summary.as_bytes())
            .and_then(|()| console.flush())
            .map_err(|e| DriverError::io("write score summary", e))?;

        let trace_path = match recorder {
            Some(rec) => {
                let n = rec.len();
                let path = rec.finish()?;
                self.progress
                    .info(format!("Beam trace: {} ({n} batches)", path.display()));
                Some(path)
            }
            None => None,
        };

        self.progress.info(format!(
            "Translation... END {:.2}s",
            self.progress.elapsed_secs() - started
        ));

        Ok(RunSummary {
            sentences: state.sentence,
            batches: state.batches,
            stats: state.stats,
            trace_path,
        })
    }

    fn process_batch<W: Write, C: Write>(
        &mut self,
        batch: &Batch,
        state: &mut RunState,
        emitter: &mut OutputEmitter<W, C>,
        recorder: Option<&mut BeamTraceRecorder<Option<T::Trace>>>,
    ) -> DriverResult<()> {
        state.batches += 1;
        let batch_no = state.batches;
        let result = self
            .translator
            .translate(batch)
            .map_err(|source| DriverError::Translator {
                batch: batch_no,
                source,
            })?;
        validate_result(batch, &result, batch_no)?;

        // A missing trace is kept as `null` so entry k stays batch k.
        if let Some(rec) = recorder {
            let trace = self.translator.take_trace();
            if trace.is_none() {
                self.progress
                    .warn(format!("batch {batch_no}: translator produced no beam trace"));
            }
            rec.record(trace);
        }

        state.stats.add_batch(batch, &result);
        emitter.emit_batch(batch, &result, &mut state.sentence)?;
        self.progress.batch_done(batch_no, batch.len(), state.sentence);
        Ok(())
    }
}

/// Rejects results that would break input/output line correspondence.
pub fn validate_result(
    batch: &Batch,
    result: &TranslationResult,
    batch_no: usize,
) -> DriverResult<()> {
    if result.hypotheses.len() != batch.len() {
        return Err(DriverError::alignment(format!(
            "batch {batch_no}: translator returned {} hypothesis lists for {} inputs",
            result.hypotheses.len(),
            batch.len()
        )));
    }
    for (record, hyps) in batch.records().iter().zip(&result.hypotheses) {
        if hyps.is_empty() {
            return Err(DriverError::MissingHypothesis {
                batch: batch_no,
                sentence: record.index,
            });
        }
    }
    if batch.has_references() {
        match result.reference_scores.as_ref() {
            Some(scores) if scores.len() == batch.len() => {}
            Some(scores) => {
                return Err(DriverError::alignment(format!(
                    "batch {batch_no}: translator returned {} reference scores for {} inputs",
                    scores.len(),
                    batch.len()
                )))
            }
            None => {
                return Err(DriverError::alignment(format!(
                    "batch {batch_no}: references were supplied but no reference scores returned"
                )))
            }
        }
    }
    Ok(())
}
