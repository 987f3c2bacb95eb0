use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::error::{Error, Result};
use crate::model::ParamLayout;

/// Named per-tensor deltas between two parameter snapshots, oriented as
/// `pre - post`: a positive entry means training moved that value down.
///
/// Computed once after a run and read-only afterwards. The key set and
/// shapes mirror the model layout exactly, one entry per trainable tensor.
#[derive(Debug, Clone)]
pub struct ParamUpdate {
    tensors: HashMap<String, ArrayD<f32>>,
    num_elements: usize,
    l2_norm: f32,
}

impl ParamUpdate {
    /// Diffs two flat snapshots into named update tensors.
    ///
    /// # Arguments
    /// * `layout` - Names and shapes describing both buffers.
    /// * `pre` - Parameter values before training.
    /// * `post` - Parameter values after training.
    pub fn compute(layout: &ParamLayout, pre: &[f32], post: &[f32]) -> Result<Self> {
        if pre.len() != layout.total_len() {
            return Err(Error::LengthMismatch {
                what: "pre-training parameters",
                got: pre.len(),
                expected: layout.total_len(),
            });
        }
        if post.len() != pre.len() {
            return Err(Error::LengthMismatch {
                what: "post-training parameters",
                got: post.len(),
                expected: pre.len(),
            });
        }

        let mut tensors = HashMap::with_capacity(layout.len());
        // Accumulated in layout order so the norm is reproducible.
        let mut squared_sum = 0.0f32;
        for entry in layout.entries() {
            let diff: Vec<f32> = pre[entry.range.clone()]
                .iter()
                .zip(&post[entry.range.clone()])
                .map(|(a, b)| a - b)
                .collect();
            squared_sum += diff.iter().map(|d| d * d).sum::<f32>();
            tensors.insert(
                entry.name.clone(),
                ArrayD::from_shape_vec(IxDyn(&entry.shape), diff).unwrap(),
            );
        }

        Ok(Self {
            tensors,
            num_elements: layout.total_len(),
            l2_norm: squared_sum.sqrt(),
        })
    }

    /// Number of update tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of values across all tensors.
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Euclidean norm of the whole flattened update.
    pub fn l2_norm(&self) -> f32 {
        self.l2_norm
    }

    pub fn get(&self, name: &str) -> Option<ArrayViewD<'_, f32>> {
        self.tensors.get(name).map(|tensor| tensor.view())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }
}
