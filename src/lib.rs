pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod heading;
pub mod history;
pub mod parser;
pub mod replay;
pub mod sensors;
pub mod session;
pub mod types;

pub use error::{CompassError, Result};
pub use types::Sample;
