use crate::error::{InferenceError, Result};
use crate::sampling::{Sampler, SamplingParams};
use addition::SequenceModel;
use gpt_core::GPT;
use tch::{Device, IndexOp, Kind, Tensor};

use std::sync::Arc;

pub struct Generator {
    model: Arc<GPT>,
    device: Device,
    params: SamplingParams,
}

impl Generator {
    pub fn new(model: Arc<GPT>, device: Device) -> Self {
        Self {
            model,
            device,
            params: SamplingParams::default(),
        }
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    /// Longest context the model reads.
    pub fn block_size(&self) -> i64 {
        self.model.config.block_size
    }

    /// Fails unless the model reads exactly `len` tokens of context, so that nothing is cropped.
    pub fn ensure_context(&self, len: usize) -> Result<()> {
        let block_size = self.block_size();
        if block_size != len as i64 {
            return Err(InferenceError::ContextMismatch {
                block_size,
                expected: len,
            });
        }
        Ok(())
    }

    /// Extends every row of `idx` ([batch, seq_len]) by `steps` tokens, one at a time.
    /// The context fed to the model is cropped to its last `block_size` tokens.
    /// Returns: [batch, seq_len + steps]
    pub fn generate(&self, idx: &Tensor, steps: usize, params: &SamplingParams) -> Result<Tensor> {
        let _guard = tch::no_grad_guard();

        let (_, prompt_len) = idx.size2()?;
        if prompt_len == 0 {
            return Err(InferenceError::EmptyPrompt);
        }

        let block_size = self.model.config.block_size;
        let mut tokens = idx.to_device(self.device);

        for _ in 0..steps {
            let (_, t) = tokens.size2()?;
            let context = if t > block_size {
                tokens.narrow(1, t - block_size, block_size)
            } else {
                tokens.shallow_clone()
            };

            let logits = self.model.forward_t(&context, false)?;
            let next_token_logits = logits.i((.., -1, ..));
            let next_token = Sampler::sample(&next_token_logits, params)?;

            tokens = Tensor::cat(&[&tokens, &next_token], 1);
        }

        Ok(tokens)
    }
}

impl SequenceModel for Generator {
    type Error = InferenceError;

    fn complete(&self, prompts: &[Vec<u8>], steps: usize) -> Result<Vec<Vec<i64>>> {
        let Some(first) = prompts.first() else {
            return Ok(Vec::new());
        };
        let prompt_len = first.len();
        if prompt_len == 0 {
            return Err(InferenceError::EmptyPrompt);
        }

        let mut flat = Vec::with_capacity(prompts.len() * prompt_len);
        for prompt in prompts {
            if prompt.len() != prompt_len {
                return Err(InferenceError::RaggedPrompts {
                    expected: prompt_len,
                    found: prompt.len(),
                });
            }
            flat.extend(prompt.iter().map(|&d| d as i64));
        }

        let input = Tensor::from_slice(&flat).view([prompts.len() as i64, prompt_len as i64]);
        let output = self.generate(&input, steps, &self.params)?;
        if steps == 0 {
            return Ok(vec![Vec::new(); prompts.len()]);
        }

        let generated = output
            .narrow(1, prompt_len as i64, steps as i64)
            .to_device(Device::Cpu)
            .to_kind(Kind::Int64)
            .contiguous()
            .view([-1]);
        let generated = Vec::<i64>::try_from(&generated)?;

        Ok(generated.chunks(steps).map(|row| row.to_vec()).collect())
    }
}
