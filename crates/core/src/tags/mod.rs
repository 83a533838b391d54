#![forbid(unsafe_code)]

mod limits;
mod normalize;

pub use limits::*;
pub use normalize::*;
