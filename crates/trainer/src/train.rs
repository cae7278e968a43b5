use addition::AdditionDataset;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tch::{nn, nn::OptimizerConfig, Device, Reduction, Tensor};

use gpt_core::{parameter_count, save_checkpoint, ModelConfig, GPT, NO_DECAY_GROUP};

use crate::dataset::{Batch, Batcher, IGNORE_INDEX};
use crate::schedule::LrSchedule;
use crate::TrainerConfig;

#[derive(Debug, Clone, Serialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    pub test_loss: Option<f64>,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainReport {
    pub epochs: Vec<EpochStats>,
    pub best_test_loss: Option<f64>,
    pub tokens_seen: u64,
    pub steps: usize,
}

/// AdamW over `vs`. Parameters in [`NO_DECAY_GROUP`] are not decayed.
pub fn adamw(vs: &nn::VarStore, config: &TrainerConfig) -> Result<nn::Optimizer> {
    let (beta1, beta2) = config.betas;
    let mut optimizer = nn::AdamW {
        beta1,
        beta2,
        wd: config.weight_decay,
        ..Default::default()
    }
    .build(vs, config.learning_rate)?;
    optimizer.set_weight_decay_group(NO_DECAY_GROUP, 0.0);
    Ok(optimizer)
}

pub struct Trainer {
    config: TrainerConfig,
    model: GPT,
    optimizer: nn::Optimizer,
    device: Device,
    vs: nn::VarStore,
}

impl Trainer {
    pub fn new(
        model_config: ModelConfig,
        trainer_config: TrainerConfig,
        device: Device,
    ) -> Result<Self> {
        if trainer_config.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }

        let vs = nn::VarStore::new(device);
        let model = GPT::new(&vs.root(), &model_config)?;
        log::info!("number of parameters: {}", parameter_count(&vs));

        let optimizer = adamw(&vs, &trainer_config)?;

        Ok(Self {
            config: trainer_config,
            model,
            optimizer,
            device,
            vs,
        })
    }

    pub fn into_model(self) -> GPT {
        self.model
    }

    fn loss(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let logits = self.model.forward_t(&batch.input, train)?;

        // Reshape for loss: [B*T, V] vs [B*T]
        let (b, t, v) = logits.size3()?;
        let logits_flat = logits.view([b * t, v]);
        let target_flat = batch.target.view([b * t]);

        Ok(logits_flat.cross_entropy_loss::<Tensor>(
            &target_flat,
            None,
            Reduction::Mean,
            IGNORE_INDEX,
            0.0,
        ))
    }

    /// Mean loss over `dataset`, without dropout or gradients.
    pub fn evaluate(&self, dataset: &AdditionDataset) -> Result<f64> {
        let _guard = tch::no_grad_guard();
        let mut total = 0.0;
        let mut batches = 0;
        for batch in Batcher::sequential(dataset, self.config.batch_size, self.device) {
            total += self.loss(&batch?, false)?.double_value(&[]);
            batches += 1;
        }
        Ok(if batches == 0 { 0.0 } else { total / batches as f64 })
    }

    pub fn train(
        &mut self,
        train: &AdditionDataset,
        test: Option<&AdditionDataset>,
    ) -> Result<TrainReport> {
        let output_tokens = (train.ndigit() + 1) as u64;
        let final_tokens = self
            .config
            .final_tokens
            .unwrap_or(self.config.max_epochs as u64 * train.len() as u64 * output_tokens);
        let schedule = if self.config.lr_decay {
            LrSchedule::new(self.config.learning_rate, self.config.warmup_tokens, final_tokens)
        } else {
            LrSchedule::constant(self.config.learning_rate)
        };
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut report = TrainReport::default();

        log::info!("Starting training with configuration: {:?}", self.config);

        for epoch in 0..self.config.max_epochs {
            let batches = Batcher::shuffled(train, self.config.batch_size, self.device, &mut rng);
            let num_batches = batches.num_batches();
            let mut epoch_loss = 0.0;
            let mut lr = schedule.lr_at(report.tokens_seen);

            for (batch_idx, batch) in batches.enumerate() {
                let batch = batch?;
                let loss = self.loss(&batch, true)?;

                // The rate for this step depends only on the tokens of earlier steps.
                lr = schedule.lr_at(report.tokens_seen);
                self.optimizer.set_lr(lr);
                self.optimizer
                    .backward_step_clip_norm(&loss, self.config.grad_norm_clip);
                report.tokens_seen += batch.tokens;
                report.steps += 1;

                let loss_val = loss.double_value(&[]);
                epoch_loss += loss_val;

                if self.config.log_every > 0 && batch_idx % self.config.log_every == 0 {
                    log::info!(
                        "epoch {} iter {}/{}: train loss {:.5}. lr {:e}",
                        epoch + 1,
                        batch_idx,
                        num_batches,
                        loss_val,
                        lr
                    );
                }
            }

            let train_loss = epoch_loss / num_batches.max(1) as f64;
            let test_loss = test.map(|t| self.evaluate(t)).transpose()?;
            match test_loss {
                Some(loss) => log::info!(
                    "epoch {} average train loss {:.5}, test loss {:.5}",
                    epoch + 1,
                    train_loss,
                    loss
                ),
                None => log::info!("epoch {} average train loss {:.5}", epoch + 1, train_loss),
            }

            // Without a test set every epoch counts as an improvement.
            let improved = match (test_loss, report.best_test_loss) {
                (Some(loss), Some(best)) => loss < best,
                _ => true,
            };
            if improved {
                if test_loss.is_some() {
                    report.best_test_loss = test_loss;
                }
                self.save_checkpoint()?;
            }

            report.epochs.push(EpochStats {
                epoch,
                train_loss,
                test_loss,
                learning_rate: lr,
            });
        }

        Ok(report)
    }

    fn save_checkpoint(&self) -> Result<()> {
        if let Some(dir) = &self.config.checkpoint_dir {
            save_checkpoint(&self.vs, &self.model.config, dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addition::DatasetConfig;
    use std::collections::HashMap;
    use tch::Kind;

    fn tiny_model() -> ModelConfig {
        ModelConfig {
            vocab_size: 10,
            block_size: 3,
            n_layer: 1,
            n_head: 2,
            n_embd: 32,
            embd_pdrop: 0.0,
            resid_pdrop: 0.0,
            attn_pdrop: 0.0,
            ..Default::default()
        }
    }

    fn one_digit() -> (AdditionDataset, AdditionDataset) {
        AdditionDataset::pair(&DatasetConfig {
            ndigit: 1,
            seed: 1337,
        })
        .unwrap()
    }

    #[test]
    fn training_reduces_loss() {
        tch::manual_seed(0);
        let (train, test) = one_digit();
        let config = TrainerConfig {
            max_epochs: 40,
            batch_size: 16,
            learning_rate: 5e-3,
            warmup_tokens: 0,
            lr_decay: false,
            checkpoint_dir: None,
            ..Default::default()
        };
        let mut trainer = Trainer::new(tiny_model(), config, Device::Cpu).unwrap();
        let before = trainer.evaluate(&train).unwrap();

        let report = trainer.train(&train, Some(&test)).unwrap();
        assert_eq!(report.epochs.len(), 40);
        assert_eq!(report.steps, 40 * 5);
        assert_eq!(report.tokens_seen, 40 * 80 * 2);

        let after = trainer.evaluate(&train).unwrap();
        assert!(after < before, "loss went from {} to {}", before, after);
        assert!(report.best_test_loss.is_some());
    }

    #[test]
    fn checkpoints_land_in_configured_dir() {
        tch::manual_seed(0);
        let dir = tempfile::tempdir().unwrap();
        let (train, _) = one_digit();
        let config = TrainerConfig {
            max_epochs: 1,
            batch_size: 32,
            checkpoint_dir: Some(dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let mut trainer = Trainer::new(tiny_model(), config, Device::Cpu).unwrap();
        let report = trainer.train(&train, None).unwrap();
        assert_eq!(report.steps, 3);
        assert!(report.best_test_loss.is_none());

        let (_vs, restored) = gpt_core::load_checkpoint(dir.path(), Device::Cpu).unwrap();
        assert_eq!(restored.config, tiny_model());
    }

    #[test]
    fn first_warmup_step_runs_at_zero_rate() {
        tch::manual_seed(0);
        let (train, _) = one_digit();
        let config = TrainerConfig {
            max_epochs: 1,
            batch_size: train.len(),
            learning_rate: 1e-2,
            lr_decay: true,
            warmup_tokens: 1_000_000,
            checkpoint_dir: None,
            ..Default::default()
        };
        let mut trainer = Trainer::new(tiny_model(), config, Device::Cpu).unwrap();
        let before = trainer.evaluate(&train).unwrap();

        let report = trainer.train(&train, None).unwrap();
        assert_eq!(report.steps, 1);
        assert_eq!(report.tokens_seen, 80 * 2);
        assert_eq!(report.epochs[0].learning_rate, 0.0);

        let after = trainer.evaluate(&train).unwrap();
        assert!((before - after).abs() < 1e-12);
    }

    #[test]
    fn weight_decay_skips_biases_norms_and_embeddings() {
        tch::manual_seed(0);
        let vs = nn::VarStore::new(Device::Cpu);
        let model = GPT::new(&vs.root(), &tiny_model()).unwrap();
        let config = TrainerConfig {
            learning_rate: 1.0,
            weight_decay: 1.0,
            ..Default::default()
        };
        let mut optimizer = adamw(&vs, &config).unwrap();

        let before: HashMap<String, Tensor> = vs
            .variables()
            .into_iter()
            .map(|(name, t)| (name, t.copy()))
            .collect();

        // Zero gradients, so only the decoupled decay moves parameters.
        let idx = Tensor::from_slice(&[1i64, 2, 3]).view([1, 3]);
        let loss = model.forward_t(&idx, true).unwrap().sum(Kind::Float) * 0.0;
        optimizer.backward_step(&loss);

        let decays = |name: &str| {
            name.ends_with(".weight")
                && !name.contains("ln_")
                && !name.starts_with("wte")
                && !name.starts_with("wpe")
        };
        for (name, t) in vs.variables() {
            if decays(&name) {
                assert_eq!(t.abs().sum(Kind::Double).double_value(&[]), 0.0, "{}", name);
            } else {
                assert!(t.equal(&before[&name]), "{} was decayed", name);
            }
        }
        assert!(vs.variables().keys().any(|name| decays(name)));
        assert!(vs.variables().keys().any(|name| name.ends_with(".bias")));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = TrainerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(Trainer::new(tiny_model(), config, Device::Cpu).is_err());
    }
}
