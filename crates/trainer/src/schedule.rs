use std::f64::consts::PI;

/// Floor of the cosine decay, as a fraction of the base rate.
const MIN_LR_FRACTION: f64 = 0.1;

/// Token-driven learning rate: linear warmup, then cosine decay down to 10% of the base rate.
#[derive(Debug, Clone, Copy)]
pub struct LrSchedule {
    base_lr: f64,
    decay: bool,
    warmup_tokens: u64,
    final_tokens: u64,
}

impl LrSchedule {
    pub fn new(base_lr: f64, warmup_tokens: u64, final_tokens: u64) -> Self {
        Self {
            base_lr,
            decay: true,
            warmup_tokens,
            final_tokens,
        }
    }

    pub fn constant(base_lr: f64) -> Self {
        Self {
            base_lr,
            decay: false,
            warmup_tokens: 0,
            final_tokens: 0,
        }
    }

    pub fn lr_at(&self, tokens_seen: u64) -> f64 {
        if !self.decay {
            return self.base_lr;
        }
        let mult = if tokens_seen < self.warmup_tokens {
            tokens_seen as f64 / self.warmup_tokens.max(1) as f64
        } else {
            let span = self.final_tokens.saturating_sub(self.warmup_tokens).max(1);
            let progress = ((tokens_seen - self.warmup_tokens) as f64 / span as f64).min(1.0);
            (0.5 * (1.0 + (PI * progress).cos())).max(MIN_LR_FRACTION)
        };
        self.base_lr * mult
    }
}
