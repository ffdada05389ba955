pub mod backend;
pub mod config;
pub mod error;
pub mod pool;
pub mod scheduler;
pub mod shutdown;
pub mod source;
pub mod usage;

pub use error::{BallastError, Result};
