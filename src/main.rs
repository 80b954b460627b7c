use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use batch_translator::models::lexicon::LexiconTranslator;
use batch_translator::pipeline::{init_default_config, BatchDriver, RunConfig, RunOverrides};
use batch_translator::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "batch-translator")]
#[command(about = "Streaming batch translation with n-best output and corpus perplexity", long_about = None)]
struct Args {
    /// Generate a default config + sample lexicon model, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: search for batch-translator.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lexicon model file
    #[arg(short, long, value_name = "TOML")]
    model: Option<PathBuf>,

    /// Source sentences to translate (one per line)
    #[arg(short, long, value_name = "TXT")]
    src: Option<PathBuf>,

    /// Reference translations, line-aligned with --src (optional)
    #[arg(short, long, value_name = "TXT")]
    tgt: Option<PathBuf>,

    /// Where to write predictions, one per line (default: pred.txt)
    #[arg(short, long, value_name = "TXT")]
    output: Option<PathBuf>,

    /// Beam size (default: 5)
    #[arg(long)]
    beam_size: Option<usize>,

    /// Sentences per batch (default: 30)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum output length in tokens (default: 100)
    #[arg(long)]
    max_sent_length: Option<usize>,

    /// Hypotheses to keep per sentence; listed in verbose output when > 1
    #[arg(long)]
    n_best: Option<usize>,

    /// Copy unknown source tokens into the output instead of <unk>
    #[arg(long)]
    replace_unk: bool,

    /// Print scores and predictions for each sentence
    #[arg(long)]
    verbose: bool,

    /// Write the beam search trace of every batch to this JSON file
    #[arg(long, value_name = "JSON")]
    dump_beam: Option<String>,

    /// Accelerator ordinal (-1 = none)
    #[arg(long, allow_negative_numbers = true)]
    gpu: Option<i32>,

    /// Random seed (negative = unset; default: 3435)
    #[arg(long, allow_negative_numbers = true)]
    seed: Option<i64>,
}

impl Args {
    fn into_overrides(self) -> RunOverrides {
        RunOverrides {
            config: self.config,
            model: self.model,
            src: self.src,
            tgt: self.tgt,
            output: self.output,
            beam_size: self.beam_size,
            batch_size: self.batch_size,
            max_sent_length: self.max_sent_length,
            n_best: self.n_best,
            replace_unk: self.replace_unk,
            verbose: self.verbose,
            dump_beam: self.dump_beam,
            gpu: self.gpu,
            seed: self.seed,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(true);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let cfg = RunConfig::resolve(args.into_overrides()).context("build config")?;
    match cfg.config_path.as_ref().filter(|p| p.exists()) {
        Some(p) => progress.info(format!("Config: {}", p.display())),
        None => progress.info("Config: defaults + command line"),
    }

    progress.info(format!("Load model: {}", cfg.model.display()));
    let translator =
        LexiconTranslator::load(&cfg.model, cfg.decode_options()).context("load model")?;
    progress.info(format!(
        "Lexicon: {} entries (lowercase={}, unk_logprob={})",
        translator.lexicon().len(),
        translator.lexicon().lowercase(),
        translator.lexicon().unk_logprob()
    ));
    if cfg.device != translator.device() {
        progress.warn(format!(
            "device {:?} requested; lexicon decoding runs on {:?}",
            cfg.device,
            translator.device()
        ));
    }
    match cfg.seed {
        Some(seed) => progress.info(format!("Seed: {seed}")),
        None => progress.info("Seed: unset"),
    }

    let source = File::open(&cfg.src)
        .with_context(|| format!("open source: {}", cfg.src.display()))?;
    let reference = match cfg.tgt.as_ref() {
        Some(p) => Some(BufReader::new(
            File::open(p).with_context(|| format!("open reference: {}", p.display()))?,
        )),
        None => None,
    };
    let output = File::create(&cfg.output)
        .with_context(|| format!("create output: {}", cfg.output.display()))?;

    let mut driver = BatchDriver::new(translator, cfg.driver_options(), progress);
    let summary = driver
        .run(
            BufReader::new(source),
            reference,
            BufWriter::new(output),
            io::stdout().lock(),
        )
        .context("translate")?;
    driver.progress().info(format!(
        "Wrote {} predictions in {} batches: {}",
        summary.sentences,
        summary.batches,
        cfg.output.display()
    ));
    Ok(())
}
