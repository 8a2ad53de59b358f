use clap::{ArgAction, Parser, Subcommand};
use std::error::Error;
use tracing::Level;

use slot_tagger::ctf::{load_atis, AtisStreams};
use slot_tagger::metrics::evaluate;
use slot_tagger::vocab::Vocabulary;
use slot_tagger::{Initializer, ModelConfig, ModelSpec, SlotTagger, WeightStore};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Recurrent slot tagger for ATIS-style queries", long_about = None)]
struct CliArgs {
    /// Repeat for more output (-v info, -vv debug)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the layer plan and every parameter shape
    Describe {
        #[clap(long, value_parser)]
        config: Option<String>,
    },
    /// Write a seeded random parameter set
    Init {
        #[clap(long, value_parser)]
        config: Option<String>,
        #[clap(long, value_parser, default_value_t = 0)]
        seed: u64,
        #[clap(long, value_parser)]
        output: String,
    },
    /// Tag one sentence, printing `word<TAB>label` per token
    Tag {
        #[clap(long, value_parser)]
        config: Option<String>,
        #[clap(long, value_parser)]
        weights: String,
        /// Query word list, one word per line
        #[clap(long, value_parser)]
        vocab: String,
        /// Slot label list, one label per line
        #[clap(long, value_parser)]
        slots: String,
        /// Word used in place of out-of-vocabulary words
        #[clap(long, value_parser)]
        unknown_word: Option<String>,
        #[clap(value_parser)]
        sentence: String,
    },
    /// Score a model on a labelled CTF file
    Eval {
        #[clap(long, value_parser)]
        config: Option<String>,
        #[clap(long, value_parser)]
        weights: String,
        #[clap(long, value_parser)]
        data: String,
        #[clap(long, value_parser)]
        limit: Option<usize>,
        /// Print the report as JSON
        #[clap(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn load_config(path: Option<&str>) -> Result<ModelConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(ModelConfig::load(path)?),
        None => Ok(ModelConfig::default()),
    }
}

fn load_model(config: Option<&str>, weights: &str) -> Result<SlotTagger, Box<dyn Error>> {
    let spec = ModelSpec::new(load_config(config)?)?;
    let mut store = WeightStore::load(weights)?;
    Ok(spec.bind(&mut store)?)
}

fn describe(config: Option<&str>) -> Result<(), Box<dyn Error>> {
    let spec = ModelSpec::new(load_config(config)?)?;
    let c = spec.config();
    println!(
        "embedding: {} x {} -> {:?} encoder",
        c.vocab_size, c.emb_dim, c.encoder
    );
    for (i, layer) in spec.encoder_plan().iter().enumerate() {
        println!("  encoder.{}: {:?} -> {}", i, layer, layer.output_dim());
    }
    println!("classifier: {} -> {}", c.hidden_dim, c.num_labels);
    println!();
    for (name, shape) in spec.parameter_shapes() {
        println!("{:<32} {:?}", name, shape);
    }
    println!("total parameters: {}", spec.parameter_count());
    Ok(())
}

fn init(config: Option<&str>, seed: u64, output: &str) -> Result<(), Box<dyn Error>> {
    let spec = ModelSpec::new(load_config(config)?)?;
    let model = spec.bind(&mut Initializer::new(seed))?;
    model.save_weights(output)?;
    println!(
        "wrote {} parameters (seed {}) to {}",
        spec.parameter_count(),
        seed,
        output
    );
    Ok(())
}

fn tag(
    config: Option<&str>,
    weights: &str,
    vocab: &str,
    slots: &str,
    unknown_word: Option<&str>,
    sentence: &str,
) -> Result<(), Box<dyn Error>> {
    let model = load_model(config, weights)?;
    let mut query_vocab = Vocabulary::load(vocab)?;
    if let Some(word) = unknown_word {
        query_vocab = query_vocab.with_fallback(word)?;
    }
    let slot_vocab = Vocabulary::load(slots)?;

    let (words, ids) = query_vocab.encode_sentence(sentence)?;
    let labels = slot_vocab.decode(&model.tag(&ids)?);
    for (word, label) in words.iter().zip(&labels) {
        println!("{}\t{}", word, label);
    }
    Ok(())
}

fn eval(
    config: Option<&str>,
    weights: &str,
    data: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let model = load_model(config, weights)?;
    let mut samples = load_atis(data, &AtisStreams::default())?;
    if let Some(limit) = limit {
        samples.truncate(limit);
    }
    let report = evaluate(&model, &samples)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("sequences:  {}", report.sequences);
        println!("tokens:     {}", report.tokens);
        println!("errors:     {}", report.errors);
        println!("error rate: {:.4}", report.error_rate());
        println!("mean loss:  {:.4}", report.mean_loss());
    }
    Ok(())
}

fn run_cli() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    // Also installs the `log` bridge, so library records reach this subscriber.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("failed to install logger: {}", e))?;

    match &args.command {
        Command::Describe { config } => describe(config.as_deref()),
        Command::Init {
            config,
            seed,
            output,
        } => init(config.as_deref(), *seed, output),
        Command::Tag {
            config,
            weights,
            vocab,
            slots,
            unknown_word,
            sentence,
        } => tag(
            config.as_deref(),
            weights,
            vocab,
            slots,
            unknown_word.as_deref(),
            sentence,
        ),
        Command::Eval {
            config,
            weights,
            data,
            limit,
            json,
        } => eval(config.as_deref(), weights, data, *limit, *json),
    }
}

fn main() {
    if let Err(e) = run_cli() {
        eprintln!("Application error: {}", e);
        let mut current_err: Option<&(dyn Error + 'static)> = e.source();
        while let Some(source) = current_err {
            eprintln!("Caused by: {}", source);
            current_err = source.source();
        }
        std::process::exit(1);
    }
}
