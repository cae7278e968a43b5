use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tch::Device;

use addition::{AdditionDataset, DatasetConfig, Exam, Sample, Split, DEFAULT_SEED};
use inference::SamplingParams;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print split sizes and the first problems of a split
    Problems {
        /// Digits per operand
        #[arg(short, long, default_value_t = 2)]
        ndigit: usize,

        /// Which split to show (train or test)
        #[arg(short, long, default_value = "test")]
        split: Split,

        /// Number of problems to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Seed of the split permutation
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Grade a trained checkpoint on a split
    Exam {
        /// Directory holding model.ot and config.json
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,

        #[arg(short, long, default_value_t = 2)]
        ndigit: usize,

        #[arg(short, long, default_value = "test")]
        split: Split,

        #[arg(short, long, default_value_t = 32)]
        batch_size: usize,

        /// Stop after this many batches (default: whole split)
        #[arg(long)]
        max_batches: Option<usize>,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Sample instead of taking the most likely digit
        #[arg(long)]
        sample: bool,

        #[arg(long, default_value_t = 1.0)]
        temperature: f64,

        #[arg(long)]
        top_k: Option<i64>,

        /// Print the mistakes as JSON
        #[arg(long)]
        json: bool,
    },
}

fn render_target(sample: &Sample) -> String {
    sample
        .target
        .iter()
        .map(|t| t.map_or("-".to_string(), |d| d.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_digits(digits: &[u8]) -> String {
    digits
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Problems {
            ndigit,
            split,
            limit,
            seed,
        } => {
            let config = DatasetConfig { ndigit, seed };
            let (train, test) =
                AdditionDataset::pair(&config).context("Failed to build the addition dataset")?;
            println!("train: {} problems, test: {} problems", train.len(), test.len());

            let dataset = match split {
                Split::Train => &train,
                Split::Test => &test,
            };
            for sample in dataset.iter().take(limit) {
                println!(
                    "{}  seq [{}]  input [{}]  target [{}]",
                    sample.problem,
                    render_digits(&sample.problem.encode()),
                    render_digits(&sample.input),
                    render_target(&sample)
                );
            }
        }
        Commands::Exam {
            checkpoint_dir,
            ndigit,
            split,
            batch_size,
            max_batches,
            seed,
            sample,
            temperature,
            top_k,
            json,
        } => {
            let dataset = AdditionDataset::new(&DatasetConfig { ndigit, seed }, split)
                .context("Failed to build the addition dataset")?;

            let device = Device::cuda_if_available();
            let params = SamplingParams {
                temperature,
                top_k,
                do_sample: sample,
            };
            let generator = inference::load_generator(&checkpoint_dir, device, params)
                .with_context(|| format!("Failed to load model from {:?}", checkpoint_dir))?;
            generator
                .ensure_context(dataset.block_size())
                .with_context(|| format!("Checkpoint does not fit {}-digit problems", ndigit))?;

            let report = Exam::run(&dataset, &generator, batch_size, max_batches)?;
            println!(
                "{} score: {}/{} = {:.2}% correct",
                split,
                report.correct,
                report.total,
                100.0 * report.score()
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&report.mistakes)?);
            } else {
                for m in &report.mistakes {
                    println!(
                        "{} + {} = {} (gt is {})",
                        m.a, m.b, m.predicted, m.expected
                    );
                }
            }
        }
    }

    Ok(())
}
