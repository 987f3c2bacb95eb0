use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

/// Batch size used when evaluating on the test split.
pub const TEST_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(256).unwrap();

/// How many mini-batches worth of training images make up the local subset.
pub const SUBSET_BATCHES: usize = 10;

/// Immutable execution bounds for one training run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "batch_trainer",
    about = "Trains SqueezeNet on a CIFAR-10 subset and reports the resulting parameter update"
)]
pub struct Config {
    /// Number of images per training mini-batch
    #[arg(long, default_value_t = NonZeroUsize::new(64).unwrap())]
    pub batch_size: NonZeroUsize,

    /// Number of passes over the sampled training subset
    #[arg(long, default_value_t = NonZeroUsize::new(10).unwrap())]
    pub epochs: NonZeroUsize,

    /// Adam step size
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f32,

    /// Seed for the master RNG; omit to seed from the OS
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory the dataset archive is cached in
    #[arg(long, default_value = "./datasets")]
    pub data_dir: PathBuf,

    /// Optional safetensors file with starting parameters
    #[arg(long)]
    pub weights: Option<PathBuf>,
}

impl Config {
    /// Returns how many training images to sample for this run.
    ///
    /// # Returns
    /// The subset length before clamping to the dataset size.
    pub fn subset_len(&self) -> usize {
        self.batch_size.get() * SUBSET_BATCHES
    }
}
