use crate::PlanError;

/// Validates a remote destination path.
///
/// Rejects:
/// - Empty paths
/// - Relative paths
/// - Paths without a file name (`/`, trailing `/`, `.` or `..` as last segment)
/// - Parent directory traversal (`..`) anywhere in the path
/// - Control characters (NUL, newline, ...)
pub fn validate_destination_path(path: &str) -> Result<(), PlanError> {
    if path.is_empty() {
        return Err(PlanError::InvalidPath("empty path".into()));
    }

    if !path.starts_with('/') {
        return Err(PlanError::InvalidPath(format!(
            "destination must be absolute: {path}"
        )));
    }

    if path.chars().any(char::is_control) {
        return Err(PlanError::InvalidPath(format!(
            "control character in path: {path:?}"
        )));
    }

    for segment in path.split('/').skip(1) {
        if segment == ".." {
            return Err(PlanError::InvalidPath(format!(
                "parent directory traversal not allowed: {path}"
            )));
        }
    }

    let (_, name) = split_destination(path);
    if name.is_empty() || name == "." {
        return Err(PlanError::InvalidPath(format!(
            "destination has no file name: {path}"
        )));
    }

    Ok(())
}

/// Splits an absolute remote path into `(directory, file name)`.
///
/// The directory of a file directly under `/` is `/`.
pub fn split_destination(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => ("", path),
    }
}
