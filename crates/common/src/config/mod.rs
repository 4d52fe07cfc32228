pub mod components;
pub mod error;
pub mod loader;

pub use components::*;
