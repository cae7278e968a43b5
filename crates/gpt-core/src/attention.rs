use tch::{nn, IndexOp, Kind, Tensor};

use crate::config::ModelConfig;
use crate::error::Result;

/// Optimizer group of parameters that take no weight decay: biases, LayerNorm and embeddings.
/// Everything else lives in the default group 0.
pub const NO_DECAY_GROUP: usize = 1;

/// Linear layer with normal(0, `stdev`) weights and a zero bias kept in [`NO_DECAY_GROUP`].
pub(crate) fn linear(
    vs: &nn::Path,
    in_dim: i64,
    out_dim: i64,
    stdev: f64,
    bias: bool,
) -> nn::Linear {
    let ws = vs.var("weight", &[out_dim, in_dim], nn::Init::Randn { mean: 0.0, stdev });
    let bs = bias.then(|| {
        vs.set_group(NO_DECAY_GROUP).var("bias", &[out_dim], nn::Init::Const(0.0))
    });
    nn::Linear { ws, bs }
}

/// Multi-head masked self-attention. Position `t` only attends to positions `<= t`.
#[derive(Debug)]
pub struct CausalSelfAttention {
    c_attn: nn::Linear,
    c_proj: nn::Linear,
    n_head: i64,
    attn_pdrop: f64,
    resid_pdrop: f64,
    mask: Tensor,
}

impl CausalSelfAttention {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let n_embd = config.n_embd;
        // Residual projections get a depth-scaled init.
        let proj_std = 0.02 / ((2 * config.n_layer) as f64).sqrt();

        let bias = config.use_bias;
        let c_attn = linear(&(vs / "c_attn"), n_embd, 3 * n_embd, 0.02, bias);
        let c_proj = linear(&(vs / "c_proj"), n_embd, n_embd, proj_std, bias);

        let bs = config.block_size;
        let mask = Tensor::ones(&[bs, bs], (Kind::Float, vs.device()))
            .tril(0)
            .reshape(&[1, 1, bs, bs]);

        Self {
            c_attn,
            c_proj,
            n_head: config.n_head,
            attn_pdrop: config.attn_pdrop,
            resid_pdrop: config.resid_pdrop,
            mask,
        }
    }

    /// x: [batch, seq_len, n_embd]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (b, t, c) = x.size3()?;
        let head_size = c / self.n_head;

        let qkv = x.apply(&self.c_attn);
        let chunks = qkv.chunk(3, -1);
        let (q, k, v) = (&chunks[0], &chunks[1], &chunks[2]);

        let q = q.view([b, t, self.n_head, head_size]).transpose(1, 2);
        let k = k.view([b, t, self.n_head, head_size]).transpose(1, 2);
        let v = v.view([b, t, self.n_head, head_size]).transpose(1, 2);

        let att = q.matmul(&k.transpose(-2, -1)) * (1.0 / (head_size as f64).sqrt());
        let mask = self.mask.i((.., .., ..t, ..t));
        let att = att
            .masked_fill(&mask.eq(0.0), f64::NEG_INFINITY)
            .softmax(-1, Kind::Float)
            .dropout(self.attn_pdrop, train);

        let y = att.matmul(&v).transpose(1, 2).contiguous().view([b, t, c]);
        Ok(y.apply(&self.c_proj).dropout(self.resid_pdrop, train))
    }
}
