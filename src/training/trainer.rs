use log::{debug, info};
use ndarray::prelude::*;

use super::loss::{CrossEntropy, accuracy};
use super::update::ParamUpdate;
use crate::data::BatchLoader;
use crate::error::{Error, Result};
use crate::model::{Mode, Sequential};
use crate::optimization::Optimizer;

/// Loss and accuracy observed during one epoch.
///
/// `train_loss` averages the per-batch training losses; the test figures
/// come from the single held-out batch probed after the epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub train_loss: f32,
    pub test_loss: f32,
    pub test_accuracy: f32,
}

/// What a finished run hands back: the parameter update against the
/// starting snapshot, plus per-epoch metrics.
#[derive(Debug)]
pub struct TrainReport {
    pub update: ParamUpdate,
    pub metrics: Vec<EpochMetrics>,
}

/// Drives the training loop: batches through the training subset, steps the
/// optimizer after every batch, and probes one test batch per epoch.
pub struct Trainer<O: Optimizer> {
    model: Sequential,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: O,
    train_loader: BatchLoader,
    test_loader: BatchLoader,
    loss_fn: CrossEntropy,
}

impl<O: Optimizer> Trainer<O> {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `model` - The network to train.
    /// * `params` - Its flat parameter buffer.
    /// * `optimizer` - The update rule applied after each batch.
    /// * `train_loader` - Shuffled loader over the training subset.
    /// * `test_loader` - Cyclic loader over the held-out split.
    pub fn new(
        model: Sequential,
        params: Vec<f32>,
        optimizer: O,
        train_loader: BatchLoader,
        test_loader: BatchLoader,
    ) -> Result<Self> {
        if params.len() != model.param_len() {
            return Err(Error::LengthMismatch {
                what: "parameters",
                got: params.len(),
                expected: model.param_len(),
            });
        }
        let grad = vec![0.0; params.len()];
        Ok(Self {
            model,
            params,
            grad,
            optimizer,
            train_loader,
            test_loader,
            loss_fn: CrossEntropy::new(),
        })
    }

    /// Parameter values as they stand now.
    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Runs `epochs` epochs and diffs the result against the parameters the
    /// trainer started with.
    pub fn run(&mut self, epochs: usize) -> Result<TrainReport> {
        let layout = self.model.layout();
        let pre = self.params.clone();
        let mut metrics = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            let train_loss = self.train_epoch(epoch)?;
            let (test_loss, test_accuracy) = self.evaluate()?;
            info!(
                "epoch {epoch}/{epochs}: train loss {train_loss:.4}, test loss {test_loss:.4}, \
                 test accuracy {test_accuracy:.4}"
            );
            metrics.push(EpochMetrics {
                train_loss,
                test_loss,
                test_accuracy,
            });
        }

        let update = ParamUpdate::compute(&layout, &pre, &self.params)?;
        Ok(TrainReport { update, metrics })
    }

    fn train_epoch(&mut self, epoch: usize) -> Result<f32> {
        self.train_loader.reset();
        let mut total = 0.0;
        let mut batches = 0;

        while let Some(batch) = self.train_loader.next_batch() {
            self.grad.fill(0.0);
            let logits = self.logits(batch.images, Mode::Train)?;
            let (loss, dlogits) = self.loss_fn.loss_and_grad(logits.view(), &batch.labels);

            let (n, c) = dlogits.dim();
            let d = dlogits.into_shape_with_order((n, c, 1, 1)).unwrap();
            self.model.backward(&self.params, &mut self.grad, d)?;
            self.optimizer.update_params(&mut self.params, &self.grad)?;

            batches += 1;
            total += loss;
            debug!("epoch {epoch} batch {batches}: loss {loss:.4}");
        }

        Ok(total / batches.max(1) as f32)
    }

    fn evaluate(&mut self) -> Result<(f32, f32)> {
        let batch = self.test_loader.next_batch_cyclic();
        let logits = self.logits(batch.images, Mode::Eval)?;
        let loss = self.loss_fn.loss(logits.view(), &batch.labels);
        Ok((loss, accuracy(logits.view(), &batch.labels)))
    }

    /// Forwards a batch and flattens the `[N, C, 1, 1]` head output into
    /// `[N, C]` logits.
    fn logits(&mut self, images: Array4<f32>, mode: Mode) -> Result<Array2<f32>> {
        let out = self.model.forward(&self.params, images, mode)?;
        let (n, c, h, w) = out.dim();
        if h != 1 || w != 1 {
            return Err(Error::ShapeMismatch {
                what: "network output",
                got: vec![n, c, h, w],
                expected: vec![n, c, 1, 1],
            });
        }
        Ok(out.into_shape_with_order((n, c)).unwrap())
    }
}
