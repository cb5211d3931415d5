#![forbid(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod model;
pub mod state;
pub mod time;

pub use error::ModelError;
pub use time::Clock;
