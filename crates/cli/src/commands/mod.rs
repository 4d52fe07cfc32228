pub mod run;
pub mod state_file;
pub mod validate;
