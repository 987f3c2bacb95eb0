use ndarray::parallel::prelude::*;
use ndarray::{CowArray, Ix2, linalg, prelude::*};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::{Error, Result};

/// How a layer's weights are filled at initialization.
#[derive(Debug, Clone, Copy)]
pub enum WeightInit {
    /// `U(-b, b)` with `b = sqrt(6 / fan_in)`.
    KaimingUniform,
    /// `N(0, std^2)`.
    Normal { std: f32 },
}

impl WeightInit {
    fn fill<R: Rng>(self, weights: &mut [f32], fan_in: usize, rng: &mut R) -> Result<()> {
        match self {
            WeightInit::KaimingUniform => {
                let bound = (6.0 / fan_in as f32).sqrt();
                let dist = Uniform::new(-bound, bound)?;
                for w in weights.iter_mut() {
                    *w = dist.sample(rng);
                }
            }
            WeightInit::Normal { std } => {
                let dist = Normal::new(0.0, std)?;
                for w in weights.iter_mut() {
                    *w = dist.sample(rng);
                }
            }
        }
        Ok(())
    }
}

/// A 2-D convolution over `[N, C, H, W]` input, with an optional fused ReLU.
///
/// Its slice of the flat parameter buffer holds `<name>.weight` as
/// `[out, in, k, k]` followed by `<name>.bias` as `[out]`. The forward pass
/// lowers each sample to a `[in*k*k, out_h*out_w]` column matrix and
/// multiplies the `[out, in*k*k]` weight view against it; 1x1 stride-1
/// unpadded convolutions skip the lowering and use the input as-is.
#[derive(Debug, Clone)]
pub struct Conv2d {
    name: String,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    relu: bool,
    init: WeightInit,

    // Forward pass metadata used during the backward pass.
    x: Array4<f32>,
    z: Array4<f32>,
}

impl Conv2d {
    /// Creates a convolution layer.
    ///
    /// # Arguments
    /// * `name` - Prefix for the layer's tensor names.
    /// * `in_channels` - Channels the input must carry.
    /// * `out_channels` - Filters, and so output channels.
    /// * `kernel` - Side length of the square kernel.
    /// * `stride` - Step between kernel applications.
    /// * `padding` - Implicit zero border added on every side.
    /// * `relu` - Whether a ReLU is fused after the bias add.
    /// * `init` - Weight initialization scheme.
    ///
    /// # Panics
    /// If `kernel` or `stride` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        relu: bool,
        init: WeightInit,
    ) -> Self {
        assert!(kernel > 0 && stride > 0, "kernel and stride must be positive");
        Self {
            name: name.into(),
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            relu,
            init,
            x: Array4::zeros((0, 0, 0, 0)),
            z: Array4::zeros((0, 0, 0, 0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn weight_len(&self) -> usize {
        self.out_channels * self.in_channels * self.kernel * self.kernel
    }

    pub fn param_len(&self) -> usize {
        self.weight_len() + self.out_channels
    }

    /// Tensor names and shapes, in buffer order.
    pub fn param_specs(&self) -> Vec<(String, Vec<usize>)> {
        vec![
            (
                format!("{}.weight", self.name),
                vec![self.out_channels, self.in_channels, self.kernel, self.kernel],
            ),
            (format!("{}.bias", self.name), vec![self.out_channels]),
        ]
    }

    /// Fills `params` with fresh weights and zero biases.
    pub fn init_params<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        debug_assert_eq!(params.len(), self.param_len());
        let (weights, biases) = params.split_at_mut(self.weight_len());
        let fan_in = self.in_channels * self.kernel * self.kernel;
        self.init.fill(weights, fan_in, rng)?;
        biases.fill(0.0);
        Ok(())
    }

    fn pointwise(&self) -> bool {
        self.kernel == 1 && self.stride == 1 && self.padding == 0
    }

    fn out_hw(&self, h: usize, w: usize) -> (usize, usize) {
        (
            (h + 2 * self.padding - self.kernel) / self.stride + 1,
            (w + 2 * self.padding - self.kernel) / self.stride + 1,
        )
    }

    /// Computes the layer output, caching what the backward pass needs.
    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        debug_assert_eq!(params.len(), self.param_len());
        let (n, c, h, w) = x.dim();
        if c != self.in_channels {
            return Err(Error::ShapeMismatch {
                what: "convolution input channels",
                got: vec![c],
                expected: vec![self.in_channels],
            });
        }
        if h + 2 * self.padding < self.kernel || w + 2 * self.padding < self.kernel {
            return Err(Error::ShapeMismatch {
                what: "convolution input plane",
                got: vec![h, w],
                expected: vec![self.kernel, self.kernel],
            });
        }

        let (oh, ow) = self.out_hw(h, w);
        let ckk = self.in_channels * self.kernel * self.kernel;
        let weights = ArrayView2::from_shape((self.out_channels, ckk), &params[..self.weight_len()]).unwrap();
        let biases = ArrayView1::from_shape(self.out_channels, &params[self.weight_len()..]).unwrap();

        let (kernel, stride, padding) = (self.kernel, self.stride, self.padding);
        let pointwise = self.pointwise();
        let mut z = Array4::zeros((n, self.out_channels, oh, ow));

        // Samples are independent, so the batch axis parallelizes cleanly.
        z.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(x.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(z_n, x_n)| {
                let mut z_mat = z_n.into_shape_with_order((weights.nrows(), oh * ow)).unwrap();
                let col: CowArray<f32, Ix2> = if pointwise {
                    x_n.into_shape_with_order((ckk, oh * ow)).unwrap().into()
                } else {
                    im2col(x_n, kernel, stride, padding, oh, ow).into()
                };
                linalg::general_mat_mul(1.0, &weights, &col, 0.0, &mut z_mat);
                for (mut row, &bias) in z_mat.outer_iter_mut().zip(biases.iter()) {
                    row += bias;
                }
            });

        self.x = x;
        let mut out = z.clone();
        self.z = z;
        if self.relu {
            out.mapv_inplace(|v| v.max(0.0));
        }
        Ok(out)
    }

    /// Accumulates weight and bias gradients into `grad` and returns the
    /// gradient with respect to the input of the last `forward` call.
    ///
    /// Samples are folded in sequentially so the accumulation order is fixed.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array4<f32>) -> Result<Array4<f32>> {
        debug_assert_eq!(grad.len(), self.param_len());
        if d.dim() != self.z.dim() {
            return Err(Error::ShapeMismatch {
                what: "convolution upstream gradient",
                got: d.shape().to_vec(),
                expected: self.z.shape().to_vec(),
            });
        }
        if self.relu {
            d.zip_mut_with(&self.z, |dv, &z| {
                if z <= 0.0 {
                    *dv = 0.0;
                }
            });
        }

        let (n, _, h, w) = self.x.dim();
        let (oh, ow) = self.out_hw(h, w);
        let ckk = self.in_channels * self.kernel * self.kernel;
        let weights = ArrayView2::from_shape((self.out_channels, ckk), &params[..self.weight_len()]).unwrap();
        let (dw_raw, db_raw) = grad.split_at_mut(self.weight_len());
        let mut dw = ArrayViewMut2::from_shape((self.out_channels, ckk), dw_raw).unwrap();
        let mut db = ArrayViewMut1::from_shape(self.out_channels, db_raw).unwrap();

        let mut dx = Array4::zeros(self.x.dim());
        for i in 0..n {
            let x_n = self.x.index_axis(Axis(0), i);
            let d_n = d.index_axis(Axis(0), i).into_shape_with_order((self.out_channels, oh * ow)).unwrap();
            db += &d_n.sum_axis(Axis(1));

            let col: CowArray<f32, Ix2> = if self.pointwise() {
                x_n.into_shape_with_order((ckk, oh * ow)).unwrap().into()
            } else {
                im2col(x_n, self.kernel, self.stride, self.padding, oh, ow).into()
            };
            linalg::general_mat_mul(1.0, &d_n, &col.t(), 1.0, &mut dw);

            let mut dcol = Array2::zeros((ckk, oh * ow));
            linalg::general_mat_mul(1.0, &weights.t(), &d_n, 0.0, &mut dcol);

            let mut dx_n = dx.index_axis_mut(Axis(0), i);
            if self.pointwise() {
                dx_n += &dcol.into_shape_with_order((self.in_channels, h, w)).unwrap();
            } else {
                col2im_add(dcol.view(), self.kernel, self.stride, self.padding, oh, ow, dx_n);
            }
        }
        Ok(dx)
    }
}

/// Lowers one `[C, H, W]` sample into a `[C*K*K, OH*OW]` column matrix.
/// Taps that fall in the zero border stay zero.
fn im2col(x: ArrayView3<f32>, kernel: usize, stride: usize, padding: usize, oh: usize, ow: usize) -> Array2<f32> {
    let (c, h, w) = x.dim();
    let mut col = Array2::zeros((c * kernel * kernel, oh * ow));
    for ci in 0..c {
        for ky in 0..kernel {
            for kx in 0..kernel {
                let mut col_row = col.row_mut((ci * kernel + ky) * kernel + kx);
                for oy in 0..oh {
                    let iy = (oy * stride + ky) as isize - padding as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for ox in 0..ow {
                        let ix = (ox * stride + kx) as isize - padding as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        col_row[oy * ow + ox] = x[[ci, iy as usize, ix as usize]];
                    }
                }
            }
        }
    }
    col
}

/// Scatter-adds a column-matrix gradient back onto the `[C, H, W]` input
/// gradient, reversing `im2col`.
fn col2im_add(
    dcol: ArrayView2<f32>,
    kernel: usize,
    stride: usize,
    padding: usize,
    oh: usize,
    ow: usize,
    mut dx: ArrayViewMut3<f32>,
) {
    let (c, h, w) = dx.dim();
    debug_assert_eq!(dcol.dim(), (c * kernel * kernel, oh * ow));
    for ci in 0..c {
        for ky in 0..kernel {
            for kx in 0..kernel {
                let dcol_row = dcol.row((ci * kernel + ky) * kernel + kx);
                for oy in 0..oh {
                    let iy = (oy * stride + ky) as isize - padding as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for ox in 0..ow {
                        let ix = (ox * stride + kx) as isize - padding as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        dx[[ci, iy as usize, ix as usize]] += dcol_row[oy * ow + ox];
                    }
                }
            }
        }
    }
}
