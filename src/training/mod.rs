mod loss;
mod trainer;
mod update;

pub use loss::{CrossEntropy, accuracy};
pub use trainer::{EpochMetrics, TrainReport, Trainer};
pub use update::ParamUpdate;
