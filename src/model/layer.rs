use ndarray::prelude::*;
use rand::Rng;
use rand::rngs::StdRng;

use super::Mode;
use super::conv::{Conv2d, WeightInit};
use super::dropout::Dropout;
use super::fire::Fire;
use super::pool::{GlobalAvgPool, MaxPool2d};
use crate::error::Result;

/// One step of the network. Enum dispatch keeps the layer chain a plain
/// `Vec` with no trait objects.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv(Conv2d),
    Pool(MaxPool2d),
    Fire(Fire),
    Dropout(Dropout),
    AvgPool(GlobalAvgPool),
}

use Layer::*;

impl Layer {
    #[allow(clippy::too_many_arguments)]
    pub fn conv(
        name: &str,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        relu: bool,
        init: WeightInit,
    ) -> Self {
        Self::Conv(Conv2d::new(name, in_channels, out_channels, kernel, stride, padding, relu, init))
    }

    pub fn max_pool(kernel: usize, stride: usize) -> Self {
        Self::Pool(MaxPool2d::new(kernel, stride))
    }

    pub fn fire(name: &str, in_channels: usize, squeeze: usize, expand1x1: usize, expand3x3: usize) -> Self {
        Self::Fire(Fire::new(name, in_channels, squeeze, expand1x1, expand3x3))
    }

    pub fn dropout(p: f32, rng: StdRng) -> Self {
        Self::Dropout(Dropout::new(p, rng))
    }

    pub fn global_avg_pool() -> Self {
        Self::AvgPool(GlobalAvgPool::new())
    }

    /// Values this layer owns inside the flat parameter buffer.
    pub fn param_len(&self) -> usize {
        match self {
            Conv(layer) => layer.param_len(),
            Fire(layer) => layer.param_len(),
            Pool(_) | Dropout(_) | AvgPool(_) => 0,
        }
    }

    /// Tensor names and shapes, in buffer order. Parameterless layers
    /// contribute nothing.
    pub fn param_specs(&self) -> Vec<(String, Vec<usize>)> {
        match self {
            Conv(layer) => layer.param_specs(),
            Fire(layer) => layer.param_specs(),
            Pool(_) | Dropout(_) | AvgPool(_) => Vec::new(),
        }
    }

    pub fn init_params<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        debug_assert_eq!(params.len(), self.param_len());
        match self {
            Conv(layer) => layer.init_params(params, rng),
            Fire(layer) => layer.init_params(params, rng),
            Pool(_) | Dropout(_) | AvgPool(_) => Ok(()),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>, mode: Mode) -> Result<Array4<f32>> {
        match self {
            Conv(layer) => layer.forward(params, x),
            Pool(layer) => layer.forward(x),
            Fire(layer) => layer.forward(params, x),
            Dropout(layer) => Ok(layer.forward(x, mode)),
            AvgPool(layer) => Ok(layer.forward(x)),
        }
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array4<f32>) -> Result<Array4<f32>> {
        match self {
            Conv(layer) => layer.backward(params, grad, d),
            Pool(layer) => layer.backward(d),
            Fire(layer) => layer.backward(params, grad, d),
            Dropout(layer) => Ok(layer.backward(d)),
            AvgPool(layer) => layer.backward(d),
        }
    }
}
