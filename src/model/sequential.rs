use ndarray::prelude::*;
use rand::Rng;

use super::Mode;
use super::layer::Layer;
use super::layout::ParamLayout;
use crate::error::{Error, Result};

/// A sequential model: information flows forward when computing an output and
/// backward when accumulating parameter gradients.
///
/// The model owns no parameters. Callers hold them as one flat buffer and
/// every pass walks it in layer order, handing each layer its slice.
#[derive(Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Total number of parameter values across all layers.
    pub fn param_len(&self) -> usize {
        self.layers.iter().map(|layer| layer.param_len()).sum()
    }

    /// Builds the name-to-range table for the flat parameter buffer.
    pub fn layout(&self) -> ParamLayout {
        let mut layout = ParamLayout::new();
        for layer in &self.layers {
            for (name, shape) in layer.param_specs() {
                layout.push(name, shape);
            }
        }
        layout.validate(self.param_len());
        layout
    }

    /// Allocates and fills a fresh parameter buffer, layer by layer in order.
    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = vec![0.0; self.param_len()];
        let mut offset = 0;
        for layer in &self.layers {
            let next = offset + layer.param_len();
            layer.init_params(&mut params[offset..next], rng)?;
            offset = next;
        }
        Ok(params)
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The flat parameter buffer.
    /// * `x` - The input batch.
    /// * `mode` - Whether stochastic layers are live.
    pub fn forward(&mut self, params: &[f32], x: Array4<f32>, mode: Mode) -> Result<Array4<f32>> {
        if params.len() != self.param_len() {
            return Err(Error::LengthMismatch {
                what: "parameters",
                got: params.len(),
                expected: self.param_len(),
            });
        }

        let mut x = x;
        let mut offset = 0;
        for layer in self.layers.iter_mut() {
            let next = offset + layer.param_len();
            x = layer.forward(&params[offset..next], x, mode)?;
            offset = next;
        }
        Ok(x)
    }

    /// Walks the layers in reverse, accumulating parameter gradients into
    /// `grad` and returning the gradient with respect to the input.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array4<f32>) -> Result<Array4<f32>> {
        if params.len() != self.param_len() {
            return Err(Error::LengthMismatch {
                what: "parameters",
                got: params.len(),
                expected: self.param_len(),
            });
        }
        if grad.len() != params.len() {
            return Err(Error::LengthMismatch {
                what: "gradient buffer",
                got: grad.len(),
                expected: params.len(),
            });
        }

        let mut d = d;
        let mut offset = self.param_len();
        for layer in self.layers.iter_mut().rev() {
            let start = offset - layer.param_len();
            d = layer.backward(&params[start..offset], &mut grad[start..offset], d)?;
            offset = start;
        }
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::conv::WeightInit;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_layer_model() -> Sequential {
        Sequential::new([
            Layer::conv("stem", 1, 2, 1, 1, 0, false, WeightInit::KaimingUniform),
            Layer::global_avg_pool(),
        ])
    }

    #[test]
    fn layout_covers_the_whole_buffer() {
        let model = two_layer_model();
        let layout = model.layout();

        assert_eq!(model.param_len(), 4);
        assert_eq!(layout.total_len(), 4);
        assert_eq!(layout.get("stem.weight").unwrap().range, 0..2);
        assert_eq!(layout.get("stem.bias").unwrap().range, 2..4);
    }

    #[test]
    fn forward_slices_params_per_layer() {
        let mut model = two_layer_model();
        // Channel 0 copies the input, channel 1 negates it and adds 1.
        let params = vec![1.0, -1.0, 0.0, 1.0];
        let x = Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        let out = model.forward(&params, x, Mode::Eval).unwrap();
        assert_eq!(out.dim(), (1, 2, 1, 1));
        assert_relative_eq!(out[[0, 0, 0, 0]], 2.5);
        assert_relative_eq!(out[[0, 1, 0, 0]], -1.5);
    }

    #[test]
    fn backward_fills_every_gradient_slot() {
        let mut model = two_layer_model();
        let mut rng = StdRng::seed_from_u64(4);
        let params = model.init_params(&mut rng).unwrap();

        let x = Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        model.forward(&params, x, Mode::Train).unwrap();

        let mut grad = vec![0.0; params.len()];
        let d = Array4::ones((1, 2, 1, 1));
        model.backward(&params, &mut grad, d).unwrap();

        // Weight gradient is the mean input per channel, bias gradient 1.
        assert_relative_eq!(grad[0], 2.5);
        assert_relative_eq!(grad[1], 2.5);
        assert_relative_eq!(grad[2], 1.0);
        assert_relative_eq!(grad[3], 1.0);
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        let mut model = two_layer_model();
        let x = Array4::zeros((1, 1, 2, 2));
        assert!(matches!(
            model.forward(&[0.0; 3], x, Mode::Eval),
            Err(Error::LengthMismatch { what: "parameters", .. })
        ));
    }
}
