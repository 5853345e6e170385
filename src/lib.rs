pub mod config;
pub mod dag;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod hcl;
pub mod output;
