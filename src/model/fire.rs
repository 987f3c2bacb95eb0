use ndarray::prelude::*;
use rand::Rng;

use super::conv::{Conv2d, WeightInit};
use crate::error::{Error, Result};

/// The SqueezeNet Fire block: a 1x1 squeeze convolution feeding two parallel
/// expands, one 1x1 and one 3x3, whose outputs concatenate on the channel
/// axis. All three convolutions carry a ReLU.
///
/// Parameter order within the block's buffer slice is squeeze, expand1x1,
/// expand3x3.
#[derive(Debug, Clone)]
pub struct Fire {
    squeeze: Conv2d,
    expand1x1: Conv2d,
    expand3x3: Conv2d,
}

impl Fire {
    /// # Arguments
    /// * `name` - Prefix for the block's tensor names.
    /// * `in_channels` - Channels the input must carry.
    /// * `squeeze` - Channels of the squeeze stage.
    /// * `expand1x1` - Channels of the 1x1 expand.
    /// * `expand3x3` - Channels of the 3x3 expand.
    pub fn new(name: &str, in_channels: usize, squeeze: usize, expand1x1: usize, expand3x3: usize) -> Self {
        Self {
            squeeze: Conv2d::new(
                format!("{name}.squeeze"),
                in_channels,
                squeeze,
                1,
                1,
                0,
                true,
                WeightInit::KaimingUniform,
            ),
            expand1x1: Conv2d::new(
                format!("{name}.expand1x1"),
                squeeze,
                expand1x1,
                1,
                1,
                0,
                true,
                WeightInit::KaimingUniform,
            ),
            expand3x3: Conv2d::new(
                format!("{name}.expand3x3"),
                squeeze,
                expand3x3,
                3,
                1,
                1,
                true,
                WeightInit::KaimingUniform,
            ),
        }
    }

    pub fn param_len(&self) -> usize {
        self.squeeze.param_len() + self.expand1x1.param_len() + self.expand3x3.param_len()
    }

    pub fn param_specs(&self) -> Vec<(String, Vec<usize>)> {
        let mut specs = self.squeeze.param_specs();
        specs.extend(self.expand1x1.param_specs());
        specs.extend(self.expand3x3.param_specs());
        specs
    }

    pub fn init_params<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let (sq, e1, e3) = split3_mut(params, self.squeeze.param_len(), self.expand1x1.param_len());
        self.squeeze.init_params(sq, rng)?;
        self.expand1x1.init_params(e1, rng)?;
        self.expand3x3.init_params(e3, rng)
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (sq, e1, e3) = split3(params, self.squeeze.param_len(), self.expand1x1.param_len());
        let squeezed = self.squeeze.forward(sq, x)?;
        let a1 = self.expand1x1.forward(e1, squeezed.clone())?;
        let a3 = self.expand3x3.forward(e3, squeezed)?;
        Ok(ndarray::concatenate(Axis(1), &[a1.view(), a3.view()]).unwrap())
    }

    /// Splits the upstream gradient back into the two expand branches, sums
    /// their input gradients and pushes the result through the squeeze.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array4<f32>) -> Result<Array4<f32>> {
        let c1 = self.expand1x1.out_channels();
        let expected = c1 + self.expand3x3.out_channels();
        if d.dim().1 != expected {
            return Err(Error::ShapeMismatch {
                what: "fire upstream gradient channels",
                got: vec![d.dim().1],
                expected: vec![expected],
            });
        }

        let (sq, e1, e3) = split3(params, self.squeeze.param_len(), self.expand1x1.param_len());
        let (g_sq, g_e1, g_e3) = split3_mut(grad, self.squeeze.param_len(), self.expand1x1.param_len());

        let d1 = d.slice(s![.., ..c1, .., ..]).to_owned();
        let d3 = d.slice(s![.., c1.., .., ..]).to_owned();
        let ds1 = self.expand1x1.backward(e1, g_e1, d1)?;
        let ds3 = self.expand3x3.backward(e3, g_e3, d3)?;
        self.squeeze.backward(sq, g_sq, ds1 + ds3)
    }
}

fn split3(params: &[f32], first: usize, second: usize) -> (&[f32], &[f32], &[f32]) {
    let (a, rest) = params.split_at(first);
    let (b, c) = rest.split_at(second);
    (a, b, c)
}

fn split3_mut(params: &mut [f32], first: usize, second: usize) -> (&mut [f32], &mut [f32], &mut [f32]) {
    let (a, rest) = params.split_at_mut(first);
    let (b, c) = rest.split_at_mut(second);
    (a, b, c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::StandardNormal;

    fn small_fire() -> (Fire, Vec<f32>) {
        let mut fire = Fire::new("f", 2, 2, 2, 2);
        let mut params = vec![0.0; fire.param_len()];
        let mut rng = StdRng::seed_from_u64(5);
        fire.init_params(&mut params, &mut rng).unwrap();
        (fire, params)
    }

    #[test]
    fn output_concatenates_both_expands() {
        let (mut fire, params) = small_fire();
        let x: Array4<f32> = Array4::random_using((1, 2, 4, 4), StandardNormal, &mut StdRng::seed_from_u64(6));
        let out = fire.forward(&params, x).unwrap();
        assert_eq!(out.dim(), (1, 4, 4, 4));
    }

    #[test]
    fn tensor_names_follow_block_order() {
        let fire = Fire::new("features.3", 64, 16, 64, 64);
        let names: Vec<String> = fire.param_specs().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "features.3.squeeze.weight",
                "features.3.squeeze.bias",
                "features.3.expand1x1.weight",
                "features.3.expand1x1.bias",
                "features.3.expand3x3.weight",
                "features.3.expand3x3.bias",
            ]
        );
        assert_eq!(
            fire.param_len(),
            (64 * 16 + 16) + (16 * 64 + 64) + (16 * 64 * 9 + 64)
        );
    }

    #[test]
    fn gradient_splits_by_expand_branch() {
        let (mut fire, params) = small_fire();
        let x: Array4<f32> = Array4::random_using((1, 2, 4, 4), StandardNormal, &mut StdRng::seed_from_u64(7));
        fire.forward(&params, x).unwrap();

        // Upstream gradient only on the expand1x1 half of the channels.
        let mut d = Array4::zeros((1, 4, 4, 4));
        d.slice_mut(s![.., ..2, .., ..]).fill(1.0);

        let mut grad = vec![0.0; fire.param_len()];
        fire.backward(&params, &mut grad, d).unwrap();

        let sq_len = 2 * 2 + 2;
        let e1_len = 2 * 2 + 2;
        let e1 = &grad[sq_len..sq_len + e1_len];
        let e3 = &grad[sq_len + e1_len..];
        assert!(e1.iter().any(|g| *g != 0.0));
        assert!(e3.iter().all(|g| *g == 0.0));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let (mut fire, params) = small_fire();
        let mut rng = StdRng::seed_from_u64(8);
        let x: Array4<f32> = Array4::random_using((1, 2, 4, 4), StandardNormal, &mut rng);
        let coeffs: Array4<f32> = Array4::random_using((1, 4, 4, 4), StandardNormal, &mut rng);

        fire.forward(&params, x.clone()).unwrap();
        let mut grad = vec![0.0; fire.param_len()];
        fire.backward(&params, &mut grad, coeffs.clone()).unwrap();

        let h = 1e-2;
        for i in 0..params.len() {
            let mut up = params.clone();
            up[i] += h;
            let mut down = params.clone();
            down[i] -= h;
            let up_sum = (&fire.forward(&up, x.clone()).unwrap() * &coeffs).sum();
            let down_sum = (&fire.forward(&down, x.clone()).unwrap() * &coeffs).sum();
            let numeric = (up_sum - down_sum) / (2.0 * h);
            // ReLU kinks make single coordinates noisy; tolerances stay loose.
            assert_relative_eq!(grad[i], numeric, epsilon = 3e-2, max_relative = 0.1);
        }
    }
}
