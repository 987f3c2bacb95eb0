pub mod cifar;
pub mod dataloader;
pub mod dataset;

pub use dataloader::{BatchLoader, sample_subset};
pub use dataset::{Batch, ImageDataset};
