pub mod inputs;
pub mod project;
pub mod target;

pub use inputs::*;
pub use project::*;
pub use target::*;
