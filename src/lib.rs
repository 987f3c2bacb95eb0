pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod optimization;
pub mod training;

pub use config::Config;
pub use error::{Error, Result};
