use ndarray::prelude::*;
use ndarray_rand::RandomExt;
use rand::distr::StandardUniform;
use rand::rngs::StdRng;

use super::Mode;

/// Inverted dropout: in training mode each value is zeroed with probability
/// `p` and survivors are scaled by `1 / (1 - p)`, so evaluation mode is the
/// plain identity.
///
/// The layer owns its RNG, which keeps the mask stream independent of every
/// other random draw in the program.
#[derive(Debug, Clone)]
pub struct Dropout {
    p: f32,
    rng: StdRng,

    // Forward pass metadata used during the backward pass.
    mask: Array4<f32>,
    active: bool,
}

impl Dropout {
    /// # Panics
    /// If `p` is outside `[0, 1)`.
    pub fn new(p: f32, rng: StdRng) -> Self {
        assert!((0.0..1.0).contains(&p), "drop probability must be in [0, 1)");
        Self {
            p,
            rng,
            mask: Array4::zeros((0, 0, 0, 0)),
            active: false,
        }
    }

    pub fn forward(&mut self, x: Array4<f32>, mode: Mode) -> Array4<f32> {
        if mode == Mode::Eval {
            self.active = false;
            return x;
        }

        let scale = 1.0 / (1.0 - self.p);
        let p = self.p;
        let mut mask: Array4<f32> = Array4::random_using(x.raw_dim(), StandardUniform, &mut self.rng);
        mask.mapv_inplace(|u| if u < p { 0.0 } else { scale });

        let mut x = x;
        x.zip_mut_with(&mask, |v, &m| *v *= m);
        self.mask = mask;
        self.active = true;
        x
    }

    /// Applies the mask of the last training-mode forward; a no-op after an
    /// evaluation-mode forward.
    pub fn backward(&mut self, d: Array4<f32>) -> Array4<f32> {
        if !self.active {
            return d;
        }
        let mut d = d;
        d.zip_mut_with(&self.mask, |v, &m| *v *= m);
        d
    }
}
