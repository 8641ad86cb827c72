//! Name and argument sanitization.
//!
//! The executor refuses arguments containing control characters; user-entered names go
//! through the same rule (plus trimming) before anything is sent to tmux.

use crate::error::ValidationError;

/// Validate a user-supplied session or window name.
///
/// Control characters are rejected before trimming, so `"name\n"` fails rather than
/// being silently cleaned up.
pub fn sanitize_name(input: &str) -> Result<String, ValidationError> {
    if let Some(position) = input.chars().position(char::is_control) {
        return Err(ValidationError::ControlCharacter { position });
    }
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(trimmed.to_string())
}

/// Like [`sanitize_name`], but blank input means "no name" instead of an error.
pub fn sanitize_optional_name(input: Option<&str>) -> Result<Option<String>, ValidationError> {
    match input {
        None => Ok(None),
        Some(text) => match sanitize_name(text) {
            Ok(name) => Ok(Some(name)),
            Err(ValidationError::Empty) => Ok(None),
            Err(e) => Err(e),
        },
    }
}

/// Check every argument of an argv vector
pub(crate) fn check_arguments(args: &[String]) -> Result<(), ValidationError> {
    match args.iter().position(|arg| arg.chars().any(char::is_control)) {
        Some(index) => Err(ValidationError::ControlArgument { index }),
        None => Ok(()),
    }
}
