use tch::{nn, Kind, Tensor};

use crate::attention::{linear, CausalSelfAttention, NO_DECAY_GROUP};
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};

fn layer_norm(vs: nn::Path, config: &ModelConfig) -> nn::LayerNorm {
    let ln_config = nn::LayerNormConfig {
        eps: config.layer_norm_epsilon,
        ..Default::default()
    };
    nn::layer_norm(vs.set_group(NO_DECAY_GROUP), vec![config.n_embd], ln_config)
}

/// FeedForward block (MLP)
#[derive(Debug)]
pub struct MLP {
    c_fc: nn::Linear,
    c_proj: nn::Linear,
    dropout: f64,
}

impl MLP {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let n_embd = config.n_embd;
        let n_hidden = 4 * n_embd;
        let proj_std = 0.02 / ((2 * config.n_layer) as f64).sqrt();

        let bias = config.use_bias;
        let c_fc = linear(&(vs / "c_fc"), n_embd, n_hidden, 0.02, bias);
        let c_proj = linear(&(vs / "c_proj"), n_hidden, n_embd, proj_std, bias);

        Self {
            c_fc,
            c_proj,
            dropout: config.resid_pdrop,
        }
    }

    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        x.apply(&self.c_fc)
            .gelu("none")
            .apply(&self.c_proj)
            .dropout(self.dropout, train)
    }
}

/// Transformer Block
#[derive(Debug)]
pub struct Block {
    ln_1: nn::LayerNorm,
    attn: CausalSelfAttention,
    ln_2: nn::LayerNorm,
    mlp: MLP,
}

impl Block {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        Self {
            ln_1: layer_norm(vs / "ln_1", config),
            attn: CausalSelfAttention::new(&(vs / "attn"), config),
            ln_2: layer_norm(vs / "ln_2", config),
            mlp: MLP::new(&(vs / "mlp"), config),
        }
    }

    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = x + self.attn.forward_t(&x.apply(&self.ln_1), train)?;
        let mlp_out = self.mlp.forward_t(&x.apply(&self.ln_2), train);
        Ok(x + mlp_out)
    }
}

/// Decoder-only transformer over a small token vocabulary.
#[derive(Debug)]
pub struct GPT {
    wte: nn::Embedding,
    wpe: nn::Embedding,
    blocks: Vec<Block>,
    ln_f: nn::LayerNorm,
    lm_head: nn::Linear,
    pub config: ModelConfig,
}

impl GPT {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        let emb_config = || nn::EmbeddingConfig {
            ws_init: nn::Init::Randn {
                mean: 0.0,
                stdev: 0.02,
            },
            ..Default::default()
        };
        let no_decay = vs.set_group(NO_DECAY_GROUP);
        let wte = nn::embedding(&no_decay / "wte", config.vocab_size, config.n_embd, emb_config());
        let wpe = nn::embedding(&no_decay / "wpe", config.block_size, config.n_embd, emb_config());

        let blocks = (0..config.n_layer)
            .map(|i| Block::new(&(vs / "h" / i), config))
            .collect();

        let ln_f = layer_norm(vs / "ln_f", config);
        let lm_head = linear(&(vs / "lm_head"), config.n_embd, config.vocab_size, 0.02, false);

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            lm_head,
            config: config.clone(),
        })
    }

    /// idx: [batch, seq_len] token ids.
    /// Returns: logits of shape [batch, seq_len, vocab_size]
    pub fn forward_t(&self, idx: &Tensor, train: bool) -> Result<Tensor> {
        let (_, t) = idx.size2()?;
        if t > self.config.block_size {
            return Err(ModelError::SequenceTooLong {
                len: t,
                block_size: self.config.block_size,
            });
        }

        let pos = Tensor::arange(t, (Kind::Int64, idx.device()));
        let tok_emb = idx.apply(&self.wte);
        let pos_emb = pos.apply(&self.wpe).unsqueeze(0);
        let mut x = (tok_emb + pos_emb).dropout(self.config.embd_pdrop, train);

        for block in &self.blocks {
            x = block.forward_t(&x, train)?;
        }

        Ok(x.apply(&self.ln_f).apply(&self.lm_head))
    }
}

/// Number of trainable scalars in `vs`.
pub fn parameter_count(vs: &nn::VarStore) -> usize {
    vs.trainable_variables().iter().map(|t| t.numel()).sum()
}
