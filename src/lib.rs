pub mod assets;
pub mod color;
pub mod config;
pub mod controller;
pub mod error;
pub mod field;
pub mod integrate;
pub mod math;
pub mod pipeline;
pub mod scene;
pub mod seed;
pub mod tessellation;

pub use error::{Result, StreamviewError};
