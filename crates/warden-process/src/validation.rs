//! Validation of program paths and names.

use std::path::Path;
use warden_common::{SupervisorError, SupervisorResult};

/// Validate that a program path is plausible before spawn.
///
/// An absolute path must exist; relative names are resolved through PATH at
/// spawn time and only checked for emptiness here.
pub fn validate_program(path: &str) -> SupervisorResult<()> {
    if path.is_empty() {
        return Err(SupervisorError::config("command cannot be empty"));
    }

    let p = Path::new(path);
    if p.is_absolute() && !p.exists() {
        return Err(SupervisorError::config(format!(
            "command does not exist: {}",
            path
        )));
    }

    Ok(())
}

/// Validate a program name used to derive instance ids.
pub fn validate_program_name(name: &str) -> SupervisorResult<()> {
    if name.is_empty() {
        return Err(SupervisorError::config("program name cannot be empty"));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SupervisorError::config(format!(
            "program name '{}' can only contain alphanumeric characters, hyphens, and underscores",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_program_rejected() {
        assert!(validate_program("").is_err());
    }

    #[test]
    fn test_missing_absolute_program_rejected() {
        assert!(validate_program("/no/such/binary/anywhere").is_err());
    }

    #[test]
    fn test_existing_program_accepted() {
        assert!(validate_program("/bin/sh").is_ok());
    }

    #[test]
    fn test_relative_program_accepted() {
        // Resolved through PATH at spawn time
        assert!(validate_program("sh").is_ok());
    }

    #[test]
    fn test_program_names() {
        assert!(validate_program_name("scan-worker").is_ok());
        assert!(validate_program_name("scan_worker_2").is_ok());
        assert!(validate_program_name("").is_err());
        assert!(validate_program_name("scan worker").is_err());
        assert!(validate_program_name("scan/worker").is_err());
    }
}
