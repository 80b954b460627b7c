use std::io::Write;

use crate::error::{DriverError, DriverResult};
use crate::models::TranslationResult;
use crate::pipeline::batch::Batch;
use crate::textutil::{display_sentence, join_tokens};

/// Writes top-1 predictions to the result stream and, in verbose mode,
/// per-sentence diagnostics to the console stream.
pub struct OutputEmitter<W, C> {
    result: W,
    console: C,
    verbose: bool,
    n_best: usize,
    lowercase: bool,
}

impl<W: Write, C: Write> OutputEmitter<W, C> {
    pub fn new(result: W, console: C, verbose: bool, n_best: usize, lowercase: bool) -> Self {
        Self {
            result,
            console,
            verbose,
            n_best,
            lowercase,
        }
    }

    /// Emits one validated batch in record order. `sentence` is the running
    /// 1-based counter shared across batches.
    pub fn emit_batch(
        &mut self,
        batch: &Batch,
        result: &TranslationResult,
        sentence: &mut usize,
    ) -> DriverResult<()> {
        for (b, (record, hyps)) in batch
            .records()
            .iter()
            .zip(&result.hypotheses)
            .enumerate()
        {
            *sentence += 1;
            let top = &hyps[0];
            let pred = join_tokens(&top.tokens);
            writeln!(self.result, "{pred}")
                .and_then(|()| self.result.flush())
                .map_err(|e| DriverError::io(format!("write result line {}", record.index), e))?;

            if !self.verbose {
                continue;
            }
            let n = *sentence;
            let mut block = String::new();
            block.push_str(&format!(
                "SENT {n}: {}\n",
                display_sentence(&record.source, self.lowercase)
            ));
            block.push_str(&format!("PRED {n}: {pred}\n"));
            block.push_str(&format!("PRED SCORE: {:.4}\n", top.score));

            if let Some(reference) = record.reference.as_ref() {
                block.push_str(&format!(
                    "GOLD {n}: {}\n",
                    display_sentence(reference, self.lowercase)
                ));
                if let Some(score) = result.reference_scores.as_ref().and_then(|s| s.get(b)) {
                    block.push_str(&format!("GOLD SCORE: {score:.4}\n"));
                }
            }

            if self.n_best > 1 {
                block.push_str("\nBEST HYP:\n");
                for hyp in hyps {
                    block.push_str(&format!("[{:.4}] {}\n", hyp.score, join_tokens(&hyp.tokens)));
                }
            }
            block.push('\n');
            self.console
                .write_all(block.as_bytes())
                .map_err(|e| DriverError::io("write console diagnostics", e))?;
        }
        Ok(())
    }

    pub fn console(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_parts(self) -> (W, C) {
        (self.result, self.console)
    }
}

#[cfg(test)]
mod tests {
    use super::OutputEmitter;
    use crate::models::{Hypothesis, TranslationResult};
    use crate::pipeline::batch::{Batch, InputRecord};

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn single(source: &str, reference: Option<&str>) -> Batch {
        Batch::new(vec![InputRecord {
            index: 1,
            source: toks(source),
            reference: reference.map(toks),
        }])
        .expect("batch")
    }

    #[test]
    fn quiet_mode_writes_only_results() {
        let batch = single("Hello World", None);
        let result = TranslationResult {
            hypotheses: vec![vec![Hypothesis::new(toks("bonjour monde"), -1.0)]],
            reference_scores: None,
        };
        let mut emitter = OutputEmitter::new(Vec::new(), Vec::new(), false, 1, false);
        let mut sentence = 0;
        emitter.emit_batch(&batch, &result, &mut sentence).expect("emit");
        let (out, console) = emitter.into_parts();
        assert_eq!(String::from_utf8(out).expect("utf8"), "bonjour monde\n");
        assert!(console.is_empty());
        assert_eq!(sentence, 1);
    }

    #[test]
    fn verbose_nbest_lists_every_hypothesis_in_order() {
        let batch = single("Hello World", Some("Bonjour Le Monde"));
        let result = TranslationResult {
            hypotheses: vec![vec![
                Hypothesis::new(toks("a"), -1.0),
                Hypothesis::new(toks("b"), -2.0),
                Hypothesis::new(toks("c"), -3.0),
            ]],
            reference_scores: Some(vec![-4.25]),
        };
        let mut emitter = OutputEmitter::new(Vec::new(), Vec::new(), true, 3, true);
        let mut sentence = 41;
        emitter.emit_batch(&batch, &result, &mut sentence).expect("emit");
        let (_, console) = emitter.into_parts();
        let text = String::from_utf8(console).expect("utf8");
        assert_eq!(
            text,
            "SENT 42: hello world\n\
             PRED 42: a\n\
             PRED SCORE: -1.0000\n\
             GOLD 42: bonjour le monde\n\
             GOLD SCORE: -4.2500\n\
             \n\
             BEST HYP:\n\
             [-1.0000] a\n\
             [-2.0000] b\n\
             [-3.0000] c\n\
             \n"
        );
    }

    #[test]
    fn single_best_skips_hypothesis_list() {
        let batch = single("x", None);
        let result = TranslationResult {
            hypotheses: vec![vec![Hypothesis::new(toks("y"), -0.5)]],
            reference_scores: None,
        };
        let mut emitter = OutputEmitter::new(Vec::new(), Vec::new(), true, 1, false);
        let mut sentence = 0;
        emitter.emit_batch(&batch, &result, &mut sentence).expect("emit");
        let (_, console) = emitter.into_parts();
        let text = String::from_utf8(console).expect("utf8");
        assert_eq!(text, "SENT 1: x\nPRED 1: y\nPRED SCORE: -0.5000\n\n");
    }
}
