pub mod config;
pub mod types;

pub use config::PeerdistConfig;
pub use types::*;
