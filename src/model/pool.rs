use ndarray::prelude::*;

use crate::error::{Error, Result};

/// Max pooling with ceil-mode output sizing.
///
/// Windows that would run past the input edge are clipped to it, so every
/// output cell pools over at least one value. Ties go to the first value in
/// row-major window order.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,

    // Forward pass metadata used during the backward pass.
    argmax: Array4<u8>,
    in_dim: (usize, usize, usize, usize),
}

impl MaxPool2d {
    /// # Panics
    /// If `kernel` is zero or `stride` is zero or larger than `kernel`.
    pub fn new(kernel: usize, stride: usize) -> Self {
        assert!(kernel > 0 && stride > 0, "kernel and stride must be positive");
        assert!(stride <= kernel, "stride must not exceed kernel");
        assert!(kernel * kernel <= u8::MAX as usize + 1, "kernel too large for u8 argmax");
        Self {
            kernel,
            stride,
            argmax: Array4::zeros((0, 0, 0, 0)),
            in_dim: (0, 0, 0, 0),
        }
    }

    fn out_hw(&self, h: usize, w: usize) -> (usize, usize) {
        // Ceil division keeps the trailing partial window.
        (
            (h - self.kernel + self.stride - 1) / self.stride + 1,
            (w - self.kernel + self.stride - 1) / self.stride + 1,
        )
    }

    /// Pools each plane, recording where every maximum came from.
    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        if h < self.kernel || w < self.kernel {
            return Err(Error::ShapeMismatch {
                what: "pooling input plane",
                got: vec![h, w],
                expected: vec![self.kernel, self.kernel],
            });
        }

        let (oh, ow) = self.out_hw(h, w);
        let mut out = Array4::zeros((n, c, oh, ow));
        let mut argmax = Array4::<u8>::zeros((n, c, oh, ow));
        for ni in 0..n {
            for ci in 0..c {
                for oy in 0..oh {
                    let y0 = oy * self.stride;
                    let y1 = (y0 + self.kernel).min(h);
                    for ox in 0..ow {
                        let x0 = ox * self.stride;
                        let x1 = (x0 + self.kernel).min(w);

                        let mut best = f32::NEG_INFINITY;
                        let mut offset = 0u8;
                        for iy in y0..y1 {
                            for ix in x0..x1 {
                                let v = x[[ni, ci, iy, ix]];
                                if v > best {
                                    best = v;
                                    offset = ((iy - y0) * self.kernel + (ix - x0)) as u8;
                                }
                            }
                        }
                        out[[ni, ci, oy, ox]] = best;
                        argmax[[ni, ci, oy, ox]] = offset;
                    }
                }
            }
        }

        self.argmax = argmax;
        self.in_dim = (n, c, h, w);
        Ok(out)
    }

    /// Routes each upstream gradient back to the cell its maximum came from.
    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        if d.dim() != self.argmax.dim() {
            return Err(Error::ShapeMismatch {
                what: "pooling upstream gradient",
                got: d.shape().to_vec(),
                expected: self.argmax.shape().to_vec(),
            });
        }

        let (n, c, oh, ow) = d.dim();
        let mut dx = Array4::zeros(self.in_dim);
        for ni in 0..n {
            for ci in 0..c {
                for oy in 0..oh {
                    for ox in 0..ow {
                        let offset = self.argmax[[ni, ci, oy, ox]] as usize;
                        let iy = oy * self.stride + offset / self.kernel;
                        let ix = ox * self.stride + offset % self.kernel;
                        dx[[ni, ci, iy, ix]] += d[[ni, ci, oy, ox]];
                    }
                }
            }
        }
        Ok(dx)
    }
}

/// Averages each channel plane down to a single value, keeping the
/// `[N, C, 1, 1]` shape so the layer chain stays uniform.
#[derive(Debug, Clone, Default)]
pub struct GlobalAvgPool {
    in_dim: (usize, usize, usize, usize),
}

impl GlobalAvgPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Array4<f32> {
        let (_, _, h, w) = x.dim();
        self.in_dim = x.dim();
        let scale = 1.0 / (h * w) as f32;
        (x.sum_axis(Axis(3)).sum_axis(Axis(2)) * scale)
            .insert_axis(Axis(2))
            .insert_axis(Axis(3))
    }

    /// Spreads each upstream value evenly back over its plane.
    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, _, _) = self.in_dim;
        if d.dim() != (n, c, 1, 1) {
            return Err(Error::ShapeMismatch {
                what: "average pooling upstream gradient",
                got: d.shape().to_vec(),
                expected: vec![n, c, 1, 1],
            });
        }

        let (_, _, h, w) = self.in_dim;
        let scale = 1.0 / (h * w) as f32;
        Ok(Array4::from_shape_fn(self.in_dim, |(ni, ci, _, _)| {
            d[[ni, ci, 0, 0]] * scale
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn max_pool_clips_the_trailing_window() {
        // 6 columns, kernel 3, stride 2: outputs at 0..3, 2..5 and a clipped 4..6.
        let mut pool = MaxPool2d::new(3, 2);
        let x = Array4::from_shape_vec((1, 1, 1, 6), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        // A single row is below the kernel height, so widen to 3 rows of the same values.
        let x = ndarray::concatenate(Axis(2), &[x.view(), x.view(), x.view()]).unwrap();
        let out = pool.forward(x).unwrap();

        assert_eq!(out.dim(), (1, 1, 1, 3));
        assert_relative_eq!(out[[0, 0, 0, 0]], 3.0);
        assert_relative_eq!(out[[0, 0, 0, 1]], 5.0);
        assert_relative_eq!(out[[0, 0, 0, 2]], 6.0);
    }

    #[test]
    fn max_pool_backward_routes_to_the_argmax() {
        let mut pool = MaxPool2d::new(2, 2);
        let x = Array4::from_shape_vec(
            (1, 1, 2, 4),
            vec![1.0, 5.0, 2.0, 2.0, 3.0, 4.0, 2.0, 2.0],
        )
        .unwrap();

        let out = pool.forward(x).unwrap();
        assert_relative_eq!(out[[0, 0, 0, 0]], 5.0);
        assert_relative_eq!(out[[0, 0, 0, 1]], 2.0);

        let d = Array4::from_shape_vec((1, 1, 1, 2), vec![10.0, 20.0]).unwrap();
        let dx = pool.backward(d).unwrap();

        // 5.0 sat at (0, 1); the tied 2.0s resolve to the first, (0, 2).
        let expected = Array4::from_shape_vec(
            (1, 1, 2, 4),
            vec![0.0, 10.0, 20.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        assert_relative_eq!(dx, expected);
    }

    #[test]
    fn max_pool_rejects_undersized_input() {
        let mut pool = MaxPool2d::new(3, 2);
        let x = Array4::zeros((1, 1, 2, 2));
        assert!(pool.forward(x).is_err());
    }

    #[test]
    fn global_avg_pool_means_and_spreads() {
        let mut pool = GlobalAvgPool::new();
        let x = Array4::from_shape_vec((1, 2, 2, 2), vec![1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0]).unwrap();

        let out = pool.forward(x);
        assert_eq!(out.dim(), (1, 2, 1, 1));
        assert_relative_eq!(out[[0, 0, 0, 0]], 2.5);
        assert_relative_eq!(out[[0, 1, 0, 0]], 25.0);

        let d = Array4::from_shape_vec((1, 2, 1, 1), vec![4.0, 8.0]).unwrap();
        let dx = pool.backward(d).unwrap();
        assert_relative_eq!(dx[[0, 0, 1, 1]], 1.0);
        assert_relative_eq!(dx[[0, 1, 0, 0]], 2.0);
    }
}
