pub mod window;

pub use crate::pipeline::processors::*;
pub use window::*;
