use std::num::NonZeroUsize;

use ndarray::prelude::*;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::dataset::{Batch, ImageDataset};

/// Draws `want` distinct sample indices from `0..population`, in random order.
///
/// `want` is clamped to the population size, so asking for more samples than
/// exist simply returns a permutation of the whole range.
pub fn sample_subset<R: Rng>(rng: &mut R, population: usize, want: usize) -> Vec<usize> {
    rand::seq::index::sample(rng, population, want.min(population)).into_vec()
}

/// Draws shuffled, owned mini-batches from an [`ImageDataset`].
///
/// The loader iterates over `indices` (a subset of, or all of, the dataset),
/// reshuffling on every [`reset`](Self::reset). Batches own their data so the
/// per-draw horizontal flip can be applied without touching the dataset.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    dataset: ImageDataset,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    drop_last: bool,
    flip: bool,
    rng: StdRng,
}

impl BatchLoader {
    /// Creates a new loader over `indices` of `dataset`.
    ///
    /// The initial order is already shuffled; callers only need [`reset`](Self::reset)
    /// between epochs.
    ///
    /// # Arguments
    /// * `dataset` - The images the indices point into.
    /// * `indices` - Which samples this loader iterates over.
    /// * `batch_size` - Number of samples per batch.
    /// * `drop_last` - Whether a trailing partial batch is discarded.
    /// * `flip` - Whether each gathered image is horizontally flipped with probability 0.5.
    /// * `rng` - Drives shuffling and flip draws.
    ///
    /// # Panics
    /// - if `indices` is empty
    /// - if any index is out of bounds for `dataset`
    pub fn new(
        dataset: ImageDataset,
        mut indices: Vec<usize>,
        batch_size: NonZeroUsize,
        drop_last: bool,
        flip: bool,
        mut rng: StdRng,
    ) -> Self {
        assert!(!indices.is_empty(), "loader indices must be non-empty");
        assert!(
            indices.iter().all(|&i| i < dataset.len()),
            "loader index out of bounds"
        );

        indices.shuffle(&mut rng);

        Self {
            dataset,
            indices,
            batch_size: batch_size.get(),
            cursor: 0,
            drop_last,
            flip,
            rng,
        }
    }

    /// Number of full batches one pass yields (ignoring a kept partial batch).
    #[inline]
    pub fn batches_per_pass(&self) -> usize {
        self.indices.len() / self.batch_size
    }

    /// Rewinds to the start of a freshly shuffled pass.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.indices.shuffle(&mut self.rng);
    }

    /// Returns the next owned batch, or None when the pass is exhausted.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let remaining = self.indices.len() - self.cursor;
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }

        let start = self.cursor;
        let end = (start + self.batch_size).min(self.indices.len());
        self.cursor = end;

        let (c, h, w) = self.dataset.image_dim();
        let mut images = Array4::zeros((end - start, c, h, w));
        let mut labels = Vec::with_capacity(end - start);

        for i in 0..end - start {
            let idx = self.indices[start + i];
            let src = self.dataset.image(idx);
            let mut dst = images.index_axis_mut(Axis(0), i);

            if self.flip && self.rng.random::<f32>() < 0.5 {
                dst.assign(&src.slice(s![.., .., ..;-1]));
            } else {
                dst.assign(&src);
            }
            labels.push(self.dataset.label(idx));
        }

        Some(Batch::new(images, labels))
    }

    /// Like [`next_batch`](Self::next_batch), but wraps around: once a pass is
    /// exhausted the loader resets (reshuffling) and the first batch of the new
    /// pass is returned.
    ///
    /// # Panics
    /// - if even a fresh pass yields nothing, which only happens for a
    ///   `drop_last` loader holding fewer indices than one batch
    pub fn next_batch_cyclic(&mut self) -> Batch {
        match self.next_batch() {
            Some(batch) => batch,
            None => {
                self.reset();
                self.next_batch()
                    .expect("a freshly reset loader must yield a batch")
            }
        }
    }
}
