pub mod color;
pub mod types;

pub use color::Color;
