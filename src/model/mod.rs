pub mod conv;
pub mod dropout;
pub mod fire;
pub mod layer;
pub mod layout;
pub mod pool;
pub mod sequential;
pub mod squeezenet;
pub mod weights;

pub use conv::{Conv2d, WeightInit};
pub use dropout::Dropout;
pub use fire::Fire;
pub use layer::Layer;
pub use layout::{ParamEntry, ParamLayout};
pub use pool::{GlobalAvgPool, MaxPool2d};
pub use sequential::Sequential;
pub use squeezenet::squeezenet;
pub use weights::load_matching;

/// Whether stochastic layers (dropout) are live or act as the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}
