pub mod config;
pub mod relay;

pub use config::*;
pub use relay::*;
