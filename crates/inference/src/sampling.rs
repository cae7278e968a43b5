use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

use crate::error::{InferenceError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    /// Keep only the `k` most likely tokens before sampling.
    pub top_k: Option<i64>,
    /// Draw from the distribution instead of taking the argmax.
    pub do_sample: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: None,
            do_sample: false,
        }
    }
}

pub struct Sampler;

impl Sampler {
    /// Pick the next token for every row of `logits`.
    /// logits: [batch, vocab_size] tensor.
    /// Returns: [batch, 1] token ids.
    pub fn sample(logits: &Tensor, params: &SamplingParams) -> Result<Tensor> {
        let _guard = tch::no_grad_guard();

        if !(params.temperature > 0.0) {
            return Err(InferenceError::InvalidParams(format!(
                "temperature must be positive, got {}",
                params.temperature
            )));
        }
        let (_, vocab) = logits.size2()?;

        // 1. Temperature scaling
        let mut scaled = logits / params.temperature;

        // 2. Top-K cutoff: everything below the k-th largest logit is removed
        if let Some(k) = params.top_k {
            if k < 1 {
                return Err(InferenceError::InvalidParams(format!(
                    "top_k must be at least 1, got {}",
                    k
                )));
            }
            let k = k.min(vocab);
            let (values, _) = scaled.topk(k, -1, true, true);
            let kth = values.narrow(-1, k - 1, 1);
            scaled = scaled.masked_fill(&scaled.lt_tensor(&kth), f64::NEG_INFINITY);
        }

        // 3. Softmax, then sample or take the most likely token
        let probs = scaled.softmax(-1, Kind::Float);
        if params.do_sample {
            Ok(probs.multinomial(1, false))
        } else {
            Ok(probs.argmax(-1, true))
        }
    }
}
