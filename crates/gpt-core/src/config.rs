use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Named model sizes. Each fixes `n_layer`, `n_head` and `n_embd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    GptNano,
    GptMicro,
    GptMini,
}

impl ModelType {
    /// `(n_layer, n_head, n_embd)`
    pub fn dims(self) -> (i64, i64, i64) {
        match self {
            ModelType::GptNano => (3, 3, 48),
            ModelType::GptMicro => (4, 4, 128),
            ModelType::GptMini => (6, 6, 192),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Size of the vocabulary.
    pub vocab_size: i64,
    /// Maximum context window size (max sequence length).
    pub block_size: i64,
    /// Number of transformer layers.
    pub n_layer: i64,
    /// Number of attention heads.
    pub n_head: i64,
    /// Dimension of the token embeddings (and internal transformer states).
    pub n_embd: i64,
    /// Dropout applied to the summed token and position embeddings.
    pub embd_pdrop: f64,
    /// Dropout applied to the output of each residual branch.
    pub resid_pdrop: f64,
    /// Dropout applied to the attention weights.
    pub attn_pdrop: f64,
    pub layer_norm_epsilon: f64,
    /// Whether to use bias in linear layers.
    pub use_bias: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 10,
            block_size: 6,
            n_layer: 2,
            n_head: 4,
            n_embd: 128,
            embd_pdrop: 0.1,
            resid_pdrop: 0.1,
            attn_pdrop: 0.1,
            layer_norm_epsilon: 1e-5,
            use_bias: true,
        }
    }
}

impl ModelConfig {
    pub fn from_type(model_type: ModelType, vocab_size: i64, block_size: i64) -> Self {
        let (n_layer, n_head, n_embd) = model_type.dims();
        Self {
            vocab_size,
            block_size,
            n_layer,
            n_head,
            n_embd,
            ..Default::default()
        }
    }

    pub fn head_size(&self) -> i64 {
        self.n_embd / self.n_head
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("vocab_size", self.vocab_size),
            ("block_size", self.block_size),
            ("n_layer", self.n_layer),
            ("n_head", self.n_head),
            ("n_embd", self.n_embd),
        ];
        for (name, value) in sizes {
            if value <= 0 {
                return Err(ModelError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.n_embd % self.n_head != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "n_embd ({}) must be divisible by n_head ({})",
                self.n_embd, self.n_head
            )));
        }
        for (name, p) in [
            ("embd_pdrop", self.embd_pdrop),
            ("resid_pdrop", self.resid_pdrop),
            ("attn_pdrop", self.attn_pdrop),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(ModelError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_fill_dimensions() {
        let config = ModelConfig::from_type(ModelType::GptNano, 10, 6);
        assert_eq!((config.n_layer, config.n_head, config.n_embd), (3, 3, 48));
        assert_eq!(config.head_size(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_indivisible_heads() {
        let config = ModelConfig {
            n_head: 3,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_empty_vocab_and_bad_dropout() {
        let config = ModelConfig {
            vocab_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ModelConfig {
            attn_pdrop: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn model_type_names() {
        let parsed: ModelType = serde_json::from_str("\"gpt-micro\"").unwrap();
        assert_eq!(parsed, ModelType::GptMicro);
    }
}
