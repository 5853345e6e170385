pub mod loader;
pub mod types;
pub mod validator;

pub use types::{CyclePolicy, ExecutionStrategy, Settings};
