//! Znode path rules.

use crate::protocol::ErrorCode;

/// Validate an absolute znode path.
///
/// For sequential creates the server appends a counter, so a trailing `/` is
/// allowed there.
pub fn validate(path: &str, sequential: bool) -> Result<(), ErrorCode> {
    if sequential {
        return validate_inner(&format!("{}1", path));
    }
    validate_inner(path)
}

fn validate_inner(path: &str) -> Result<(), ErrorCode> {
    if !path.starts_with('/') {
        return Err(ErrorCode::BadArguments);
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(ErrorCode::BadArguments);
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(ErrorCode::BadArguments);
        }
        if segment.chars().any(is_forbidden) {
            return Err(ErrorCode::BadArguments);
        }
    }
    Ok(())
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\u{0000}'..='\u{001f}'
        | '\u{007f}'..='\u{009f}'
        | '\u{f000}'..='\u{f8ff}'
        | '\u{fff0}'..='\u{ffff}')
}

/// Parent of a validated, non-root path.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Last segment of a validated, non-root path.
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
