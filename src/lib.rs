pub mod config;
pub mod display;
pub mod grid;
pub mod renderer;
pub mod window;
