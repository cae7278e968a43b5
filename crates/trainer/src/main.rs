use anyhow::{Context, Result};
use std::sync::Arc;
use tch::Device;

use addition::{AdditionDataset, DatasetConfig, Exam};
use gpt_core::ModelConfig;
use inference::Generator;
use trainer::{load_config_or_default, Trainer, TrainerConfig};

fn main() -> Result<()> {
    env_logger::init();

    // 1. Load configs from configs/
    let data_config: DatasetConfig = load_config_or_default("configs/data_config.yaml")?;
    let mut model_config: ModelConfig = load_config_or_default("configs/model_config.yaml")?;
    let trainer_config: TrainerConfig = load_config_or_default("configs/training_config.yaml")?;

    // 2. Build the train/test split
    let (train, test) =
        AdditionDataset::pair(&data_config).context("Failed to build the addition dataset")?;
    log::info!(
        "{}-digit addition: {} train / {} test problems",
        data_config.ndigit,
        train.len(),
        test.len()
    );

    // The vocabulary and context are fixed by the task
    model_config.vocab_size = train.vocab_size() as i64;
    model_config.block_size = train.block_size() as i64;

    let device = Device::cuda_if_available();
    log::info!("Using device: {:?}", device);
    tch::manual_seed(trainer_config.seed as i64);

    // 3. Train
    let exam_batch_size = trainer_config.batch_size;
    let mut trainer = Trainer::new(model_config, trainer_config, device)?;
    let report = trainer.train(&train, Some(&test))?;
    if let Some(best) = report.best_test_loss {
        log::info!("best test loss {:.5} after {} steps", best, report.steps);
    }

    // 4. Exam: a sample of the training set, then every held-out problem
    let generator = Generator::new(Arc::new(trainer.into_model()), device);
    let train_report = Exam::run(&train, &generator, exam_batch_size, Some(10))?;
    let test_report = Exam::run(&test, &generator, exam_batch_size, None)?;

    println!(
        "train score: {}/{} = {:.2}% correct",
        train_report.correct,
        train_report.total,
        100.0 * train_report.score()
    );
    println!(
        "test score: {}/{} = {:.2}% correct",
        test_report.correct,
        test_report.total,
        100.0 * test_report.score()
    );

    Ok(())
}
