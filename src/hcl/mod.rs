//! Best-effort reading of terragrunt definition files.
//!
//! These files are treated as opaque text: a handful of regexes pull out
//! dependency references, the module source and flat locals. Anything that
//! does not match is ignored rather than reported.

pub mod extract;

use std::path::Path;

pub use extract::{
    check_structure, extract_dependencies, extract_locals, extract_source, Definition,
    StructureReport,
};

/// Read and extract a definition file. `unit_path` is the owning directory
/// relative to the scan root.
pub fn read_definition(file: &Path, unit_path: &str) -> std::io::Result<Definition> {
    let contents = std::fs::read_to_string(file)?;
    tracing::debug!(file = %file.display(), "Read definition file");
    Ok(Definition::from_contents(contents, unit_path))
}
