use std::path::PathBuf;

use batch_translator::error::DriverError;
use batch_translator::models::{Hypothesis, TranslationResult, Translator};
use batch_translator::pipeline::batch::Batch;
use batch_translator::pipeline::scores::ScoreReport;
use batch_translator::pipeline::{BatchDriver, DriverOptions, RunSummary};
use batch_translator::progress::ConsoleProgress;
use serde::Serialize;

#[derive(Clone, Copy, Default, PartialEq)]
enum Fault {
    #[default]
    None,
    DropLast,
    EmptyList,
    FailOnBatch(usize),
    NoTraceOnBatch(usize),
}

/// Uppercases each source token; score is -1 per token. The n-best tail
/// repeats the top hypothesis with one extra point of penalty per rank.
#[derive(Default)]
struct ScriptedTranslator {
    n_best: usize,
    lowercase: bool,
    fault: Fault,
    calls: usize,
    batch_sizes: Vec<usize>,
    tracing: bool,
    last_trace: Option<TraceEntry>,
}

#[derive(Serialize)]
struct TraceEntry {
    call: usize,
    size: usize,
}

impl Translator for ScriptedTranslator {
    type Trace = TraceEntry;

    fn translate(&mut self, batch: &Batch) -> anyhow::Result<TranslationResult> {
        self.calls += 1;
        self.batch_sizes.push(batch.len());
        if self.fault == Fault::FailOnBatch(self.calls) {
            anyhow::bail!("decoder blew up");
        }
        let mut hypotheses: Vec<Vec<Hypothesis>> = batch
            .sources()
            .map(|src| {
                let tokens: Vec<String> = src.iter().map(|t| t.to_uppercase()).collect();
                let base = -(tokens.len() as f64);
                (0..self.n_best.max(1))
                    .map(|rank| Hypothesis::new(tokens.clone(), base - rank as f64))
                    .collect()
            })
            .collect();
        match self.fault {
            Fault::DropLast => {
                hypotheses.pop();
            }
            Fault::EmptyList => hypotheses[0].clear(),
            _ => {}
        }
        let reference_scores = batch
            .references()
            .map(|refs| refs.iter().map(|r| -2.0 * r.len() as f64).collect());
        if self.tracing && self.fault != Fault::NoTraceOnBatch(self.calls) {
            self.last_trace = Some(TraceEntry {
                call: self.calls,
                size: batch.len(),
            });
        }
        Ok(TranslationResult {
            hypotheses,
            reference_scores,
        })
    }

    fn target_lowercase(&self) -> bool {
        self.lowercase
    }

    fn enable_trace_recording(&mut self) {
        self.tracing = true;
    }

    fn take_trace(&mut self) -> Option<TraceEntry> {
        self.last_trace.take()
    }
}

struct Outcome {
    summary: Result<RunSummary, DriverError>,
    output: String,
    console: String,
    translator: ScriptedTranslator,
}

fn run(
    source: &str,
    reference: Option<&str>,
    opts: DriverOptions,
    translator: ScriptedTranslator,
) -> Outcome {
    let mut driver = BatchDriver::new(translator, opts, ConsoleProgress::new(false));
    let mut output = Vec::new();
    let mut console = Vec::new();
    let summary = driver.run(
        source.as_bytes(),
        reference.map(str::as_bytes),
        &mut output,
        &mut console,
    );
    Outcome {
        summary,
        output: String::from_utf8(output).expect("utf8 output"),
        console: String::from_utf8(console).expect("utf8 console"),
        translator: driver.into_translator(),
    }
}

fn numbered(n: usize) -> String {
    (1..=n).map(|i| format!("word{i} x\n")).collect()
}

fn opts(batch_size: usize) -> DriverOptions {
    DriverOptions {
        batch_size,
        ..DriverOptions::default()
    }
}

#[test]
fn output_lines_match_input_lines_in_order() {
    for (n, cap) in [(0, 30), (1, 30), (30, 30), (31, 30), (7, 3), (5, 1)] {
        let out = run(&numbered(n), None, opts(cap), ScriptedTranslator::default());
        let summary = out.summary.expect("run");
        assert_eq!(summary.sentences, n);
        assert_eq!(summary.batches, n.div_ceil(cap));
        let lines: Vec<&str> = out.output.lines().collect();
        assert_eq!(lines.len(), n);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("WORD{} X", i + 1));
        }
        let sizes = &out.translator.batch_sizes;
        assert_eq!(sizes.iter().sum::<usize>(), n);
        if let Some((_, head)) = sizes.split_last() {
            assert!(head.iter().all(|&s| s == cap));
        }
    }
}

#[test]
fn empty_input_reports_undefined_scores() {
    let out = run("", Some(""), opts(30), ScriptedTranslator::default());
    let summary = out.summary.expect("run");
    assert_eq!(summary.sentences, 0);
    assert_eq!(summary.batches, 0);
    assert!(out.output.is_empty());
    assert_eq!(
        out.console,
        "PRED AVG SCORE: undef, PRED PPL: undef\nGOLD AVG SCORE: undef, GOLD PPL: undef\n"
    );
}

#[test]
fn batch_size_does_not_change_results() {
    let input = "a b c\n\nd\ne f\ng h i j\nk\nl m\n";
    let refs = "A B\nz\nD\nE F\nG\nK\nL M\n";
    let verbose = |cap| DriverOptions {
        batch_size: cap,
        n_best: 2,
        verbose: true,
        dump_beam: None,
    };
    let tr = || ScriptedTranslator {
        n_best: 2,
        ..ScriptedTranslator::default()
    };
    let one = run(input, Some(refs), verbose(1), tr());
    let many = run(input, Some(refs), verbose(30), tr());
    assert_eq!(one.output, many.output);
    assert_eq!(one.console, many.console);
    assert_eq!(
        one.summary.expect("one").stats,
        many.summary.expect("many").stats
    );
}

#[test]
fn sentence_counter_runs_across_batches() {
    let out = run(
        &numbered(5),
        None,
        DriverOptions {
            batch_size: 2,
            verbose: true,
            ..DriverOptions::default()
        },
        ScriptedTranslator::default(),
    );
    out.summary.expect("run");
    for i in 1..=5 {
        assert!(out.console.contains(&format!("SENT {i}: word{i} x\n")));
        assert!(out.console.contains(&format!("PRED {i}: WORD{i} X\n")));
    }
    assert!(!out.console.contains("SENT 6"));
}

#[test]
fn aggregates_prediction_and_reference_scores() {
    let out = run(
        "a b\nc d e\n",
        Some("x\ny z\n"),
        opts(30),
        ScriptedTranslator::default(),
    );
    let summary = out.summary.expect("run");
    assert_eq!(summary.stats.pred.words, 5);
    assert!((summary.stats.pred.score + 5.0).abs() < 1e-12);
    assert_eq!(summary.stats.gold.words, 3);
    assert!((summary.stats.gold.score + 6.0).abs() < 1e-12);
    match summary.stats.gold.report() {
        ScoreReport::Defined { avg_score, .. } => assert!((avg_score + 2.0).abs() < 1e-12),
        ScoreReport::Undefined => panic!("expected defined gold report"),
    }
    assert!(out
        .console
        .ends_with("PRED AVG SCORE: -1.0000, PRED PPL: 2.7183\nGOLD AVG SCORE: -2.0000, GOLD PPL: 7.3891\n"));
}

#[test]
fn verbose_nbest_lists_ranked_hypotheses() {
    let out = run(
        "Hello There\n",
        Some("Salut\n"),
        DriverOptions {
            batch_size: 30,
            n_best: 3,
            verbose: true,
            dump_beam: None,
        },
        ScriptedTranslator {
            n_best: 3,
            lowercase: true,
            ..ScriptedTranslator::default()
        },
    );
    out.summary.expect("run");
    let expected = "SENT 1: hello there\n\
                    PRED 1: HELLO THERE\n\
                    PRED SCORE: -2.0000\n\
                    GOLD 1: salut\n\
                    GOLD SCORE: -2.0000\n\
                    \n\
                    BEST HYP:\n\
                    [-2.0000] HELLO THERE\n\
                    [-3.0000] HELLO THERE\n\
                    [-4.0000] HELLO THERE\n\
                    \n";
    assert!(out.console.starts_with(expected), "{}", out.console);
}

#[test]
fn short_reference_aborts_after_last_complete_batch() {
    let out = run(
        &numbered(5),
        Some("r1\nr2\nr3\n"),
        opts(2),
        ScriptedTranslator::default(),
    );
    let err = out.summary.expect_err("alignment");
    assert!(err.is_alignment(), "{err}");
    let lines: Vec<&str> = out.output.lines().collect();
    assert_eq!(lines, vec!["WORD1 X", "WORD2 X"]);
    assert_eq!(out.translator.calls, 1);
}

#[test]
fn longer_reference_is_accepted() {
    let out = run("a\nb\n", Some("x\ny\nextra\nlines\n"), opts(30), ScriptedTranslator::default());
    let summary = out.summary.expect("run");
    assert_eq!(summary.sentences, 2);
    assert_eq!(summary.stats.gold.words, 2);
}

#[test]
fn translator_result_length_mismatch_is_fatal() {
    let out = run(
        &numbered(3),
        None,
        opts(30),
        ScriptedTranslator {
            fault: Fault::DropLast,
            ..ScriptedTranslator::default()
        },
    );
    assert!(out.summary.expect_err("mismatch").is_alignment());
    assert!(out.output.is_empty());
}

#[test]
fn missing_top_hypothesis_is_fatal() {
    let out = run(
        &numbered(2),
        None,
        opts(30),
        ScriptedTranslator {
            fault: Fault::EmptyList,
            ..ScriptedTranslator::default()
        },
    );
    assert!(matches!(
        out.summary,
        Err(DriverError::MissingHypothesis { batch: 1, sentence: 1 })
    ));
}

#[test]
fn translator_failure_keeps_flushed_output() {
    let out = run(
        &numbered(5),
        None,
        opts(2),
        ScriptedTranslator {
            fault: Fault::FailOnBatch(2),
            ..ScriptedTranslator::default()
        },
    );
    assert!(matches!(out.summary, Err(DriverError::Translator { batch: 2, .. })));
    assert_eq!(out.output, "WORD1 X\nWORD2 X\n");
}

#[test]
fn beam_trace_is_written_once_per_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path: PathBuf = dir.path().join("beam.json");
    let out = run(
        &numbered(5),
        None,
        DriverOptions {
            batch_size: 2,
            dump_beam: Some(path.clone()),
            ..DriverOptions::default()
        },
        ScriptedTranslator::default(),
    );
    let summary = out.summary.expect("run");
    assert_eq!(summary.trace_path.as_deref(), Some(path.as_path()));
    let text = std::fs::read_to_string(&path).expect("trace file");
    let json: serde_json::Value = serde_json::from_str(&text).expect("json");
    let entries = json.as_array().expect("array");
    assert_eq!(entries.len(), 3);
    let sizes: Vec<u64> = entries
        .iter()
        .map(|e| e["size"].as_u64().expect("size"))
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(entries[2]["call"], 3);
}

#[test]
fn missing_batch_trace_keeps_its_slot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("beam.json");
    let out = run(
        &numbered(5),
        None,
        DriverOptions {
            batch_size: 2,
            dump_beam: Some(path.clone()),
            ..DriverOptions::default()
        },
        ScriptedTranslator {
            fault: Fault::NoTraceOnBatch(2),
            ..ScriptedTranslator::default()
        },
    );
    out.summary.expect("run");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("trace file")).expect("json");
    let entries = json.as_array().expect("array");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["call"], 1);
    assert!(entries[1].is_null());
    assert_eq!(entries[2]["call"], 3);
}

#[test]
fn failed_run_leaves_no_trace_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("beam.json");
    let out = run(
        &numbered(4),
        None,
        DriverOptions {
            batch_size: 2,
            dump_beam: Some(path.clone()),
            ..DriverOptions::default()
        },
        ScriptedTranslator {
            fault: Fault::FailOnBatch(2),
            ..ScriptedTranslator::default()
        },
    );
    assert!(out.summary.is_err());
    assert!(!path.exists());
}

#[test]
fn zero_batch_size_is_rejected() {
    let out = run("a\n", None, opts(0), ScriptedTranslator::default());
    assert!(matches!(out.summary, Err(DriverError::InvalidConfig { .. })));
}
