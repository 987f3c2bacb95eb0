use ndarray::prelude::*;

/// Softmax cross-entropy over `[N, C]` logits, averaged over the batch.
///
/// Losses and gradients go through the shifted log-sum-exp form, so large
/// logits stay finite.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }

    /// Mean loss over the batch.
    ///
    /// # Panics
    /// If row and label counts differ, or a label is out of range.
    pub fn loss(&self, logits: ArrayView2<f32>, labels: &[u8]) -> f32 {
        assert_eq!(logits.nrows(), labels.len(), "one label per logit row");
        let mut total = 0.0;
        for (row, &label) in logits.outer_iter().zip(labels) {
            total += log_sum_exp(row) - row[label as usize];
        }
        total / labels.len() as f32
    }

    /// Mean loss together with its gradient with respect to the logits,
    /// which is `(softmax - onehot) / N` row by row.
    pub fn loss_and_grad(&self, logits: ArrayView2<f32>, labels: &[u8]) -> (f32, Array2<f32>) {
        assert_eq!(logits.nrows(), labels.len(), "one label per logit row");
        let n = labels.len() as f32;
        let mut grad = Array2::zeros(logits.raw_dim());
        let mut total = 0.0;

        for ((row, mut grad_row), &label) in logits.outer_iter().zip(grad.outer_iter_mut()).zip(labels) {
            let lse = log_sum_exp(row);
            total += lse - row[label as usize];
            for (g, &z) in grad_row.iter_mut().zip(row) {
                *g = (z - lse).exp() / n;
            }
            grad_row[label as usize] -= 1.0 / n;
        }

        (total / n, grad)
    }
}

/// Fraction of rows whose largest logit sits at the label.
pub fn accuracy(logits: ArrayView2<f32>, labels: &[u8]) -> f32 {
    assert_eq!(logits.nrows(), labels.len(), "one label per logit row");
    let mut correct = 0;
    for (row, &label) in logits.outer_iter().zip(labels) {
        if argmax(row) == label as usize {
            correct += 1;
        }
    }
    correct as f32 / labels.len() as f32
}

fn log_sum_exp(row: ArrayView1<f32>) -> f32 {
    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let sum: f32 = row.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
