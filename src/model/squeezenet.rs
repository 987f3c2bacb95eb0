use rand::rngs::StdRng;

use super::conv::WeightInit;
use super::layer::Layer;
use super::sequential::Sequential;

/// Builds SqueezeNet v1.1 for `num_classes` outputs.
///
/// The stem downsamples aggressively, three max pools interleave with the
/// eight fire blocks, and a 1x1 classifier convolution followed by global
/// average pooling produces `[N, num_classes, 1, 1]`. On 32x32 input the
/// final feature planes are 1x1.
///
/// Tensor names follow the `features.*` / `classifier.*` checkpoint
/// convention, so exported weight files line up name for name.
pub fn squeezenet(num_classes: usize, dropout_rng: StdRng) -> Sequential {
    Sequential::new([
        Layer::conv("features.0", 3, 64, 3, 2, 0, true, WeightInit::KaimingUniform),
        Layer::max_pool(3, 2),
        Layer::fire("features.3", 64, 16, 64, 64),
        Layer::fire("features.4", 128, 16, 64, 64),
        Layer::max_pool(3, 2),
        Layer::fire("features.6", 128, 32, 128, 128),
        Layer::fire("features.7", 256, 32, 128, 128),
        Layer::max_pool(3, 2),
        Layer::fire("features.9", 256, 48, 192, 192),
        Layer::fire("features.10", 384, 48, 192, 192),
        Layer::fire("features.11", 384, 64, 256, 256),
        Layer::fire("features.12", 512, 64, 256, 256),
        Layer::dropout(0.5, dropout_rng),
        Layer::conv("classifier.1", 512, num_classes, 1, 1, 0, true, WeightInit::Normal { std: 0.01 }),
        Layer::global_avg_pool(),
    ])
}
