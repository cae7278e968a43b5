use addition::{AdditionDataset, Sample};
use rand::seq::SliceRandom;
use rand::Rng;
use tch::{Device, Tensor};

/// Target value the loss skips. Masked target positions are written as this.
pub const IGNORE_INDEX: i64 = -1;

pub struct Batch {
    /// [batch_size, block_size]
    pub input: Tensor,
    /// [batch_size, block_size], `IGNORE_INDEX` at masked positions
    pub target: Tensor,
    /// Number of unmasked target positions.
    pub tokens: u64,
}

/// Stacks samples into input and target tensors.
pub fn collate(samples: &[Sample], device: Device) -> Batch {
    let rows = samples.len() as i64;
    let cols = samples.first().map_or(0, |s| s.input.len()) as i64;

    let mut inputs = Vec::with_capacity(samples.len() * cols as usize);
    let mut targets = Vec::with_capacity(samples.len() * cols as usize);
    let mut tokens = 0;

    for sample in samples {
        inputs.extend(sample.input.iter().map(|&d| d as i64));
        for t in &sample.target {
            match t {
                Some(d) => {
                    targets.push(*d as i64);
                    tokens += 1;
                }
                None => targets.push(IGNORE_INDEX),
            }
        }
    }

    let input = Tensor::from_slice(&inputs).view([rows, cols]).to(device);
    let target = Tensor::from_slice(&targets).view([rows, cols]).to(device);

    Batch {
        input,
        target,
        tokens,
    }
}

/// Walks a dataset in batches. The last batch may be smaller than `batch_size`.
pub struct Batcher<'a> {
    dataset: &'a AdditionDataset,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
    device: Device,
}

impl<'a> Batcher<'a> {
    /// Visits the dataset in index order.
    pub fn sequential(dataset: &'a AdditionDataset, batch_size: usize, device: Device) -> Self {
        Self {
            dataset,
            order: (0..dataset.len()).collect(),
            batch_size: batch_size.max(1),
            pos: 0,
            device,
        }
    }

    /// Visits the dataset in an order drawn from `rng`.
    pub fn shuffled<R: Rng + ?Sized>(
        dataset: &'a AdditionDataset,
        batch_size: usize,
        device: Device,
        rng: &mut R,
    ) -> Self {
        let mut batcher = Self::sequential(dataset, batch_size, device);
        batcher.order.shuffle(rng);
        batcher
    }

    pub fn num_batches(&self) -> usize {
        (self.order.len() + self.batch_size - 1) / self.batch_size
    }
}

impl<'a> Iterator for Batcher<'a> {
    type Item = addition::Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let samples: addition::Result<Vec<Sample>> = self.order[self.pos..end]
            .iter()
            .map(|&i| self.dataset.get(i))
            .collect();
        self.pos = end;
        Some(samples.map(|s| collate(&s, self.device)))
    }
}
