pub mod engine;
pub mod output_parser;
pub mod retry;
pub mod runner;
pub mod terragrunt;

pub use engine::{Execution, StackExecutor, UnitResult, UnitRunStatus};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner, TIMEOUT_EXIT_CODE};
pub use terragrunt::Terragrunt;
