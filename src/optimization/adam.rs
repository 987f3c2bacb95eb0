use super::Optimizer;
use crate::error::{Error, Result};

const DEFAULT_BETA1: f32 = 0.9;
const DEFAULT_BETA2: f32 = 0.999;
const DEFAULT_EPSILON: f32 = 1e-8;

/// Adam: gradient descent with per-parameter first and second moment
/// estimates and bias correction.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer with the usual moment defaults.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    pub fn new(len: usize, learning_rate: f32) -> Self {
        Self::with_hyperparams(len, learning_rate, DEFAULT_BETA1, DEFAULT_BETA2, DEFAULT_EPSILON)
    }

    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    pub fn with_hyperparams(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            epsilon,
        }
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        if params.len() != self.v.len() {
            return Err(Error::LengthMismatch {
                what: "optimizer parameters",
                got: params.len(),
                expected: self.v.len(),
            });
        }
        if grad.len() != params.len() {
            return Err(Error::LengthMismatch {
                what: "gradient",
                got: grad.len(),
                expected: params.len(),
            });
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        params
            .iter_mut()
            .zip(grad)
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
            .for_each(|(((p, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_step_moves_by_learning_rate_against_the_gradient() {
        // Bias correction makes the very first step lr * sign(g), up to epsilon.
        let mut adam = Adam::new(3, 0.1);
        let mut params = vec![1.0, 1.0, 1.0];
        adam.update_params(&mut params, &[0.5, -2.0, 0.0]).unwrap();

        assert_relative_eq!(params[0], 0.9, epsilon = 1e-4);
        assert_relative_eq!(params[1], 1.1, epsilon = 1e-4);
        assert_relative_eq!(params[2], 1.0);
    }

    #[test]
    fn constant_gradient_keeps_stepping_downhill() {
        let mut adam = Adam::new(1, 0.01);
        let mut params = vec![5.0];
        let mut previous = params[0];
        for _ in 0..10 {
            adam.update_params(&mut params, &[1.0]).unwrap();
            assert!(params[0] < previous);
            previous = params[0];
        }
    }

    #[test]
    fn length_mismatches_are_rejected() {
        let mut adam = Adam::new(2, 0.01);
        let mut params = vec![0.0; 3];
        assert!(matches!(
            adam.update_params(&mut params, &[0.0; 3]),
            Err(Error::LengthMismatch { what: "optimizer parameters", .. })
        ));

        let mut params = vec![0.0; 2];
        assert!(matches!(
            adam.update_params(&mut params, &[0.0; 3]),
            Err(Error::LengthMismatch { what: "gradient", .. })
        ));
    }
}
