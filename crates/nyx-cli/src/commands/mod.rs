pub mod trigger;
pub mod watch;

use anyhow::{Context, Result};

/// Resolve a specification argument: `@path` reads the file, anything else is
/// taken as inline JSON.
pub fn read_spec(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read specification file {path}")),
        None => Ok(arg.to_string()),
    }
}
