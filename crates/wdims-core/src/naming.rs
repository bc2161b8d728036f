//! Profile-name rules. A profile name becomes a directory name and part of
//! each settings file name, so anything that could escape the profiles
//! directory or is unusable as a file name on common platforms is refused.

use thiserror::Error;

pub const DEFAULT_PROFILE: &str = "default";

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("profile name cannot be empty")]
    Empty,
    #[error("invalid profile name: path traversal detected")]
    PathTraversal,
    #[error("profile name contains invalid character {0:?}")]
    ForbiddenChar(char),
    #[error("profile name {0:?} is a reserved device name")]
    Reserved(String),
}

pub fn validate_profile_name(name: &str) -> Result<(), NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(NameError::PathTraversal);
    }
    if let Some(ch) = name
        .chars()
        .find(|ch| FORBIDDEN_CHARS.contains(ch) || ('\u{0}'..='\u{1f}').contains(ch))
    {
        return Err(NameError::ForbiddenChar(ch));
    }
    let upper = name.to_uppercase();
    if RESERVED_NAMES.contains(&upper.as_str()) {
        return Err(NameError::Reserved(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["default", "work", "home office", "日本語", "a.b", "COM10", "console"] {
            assert_eq!(validate_profile_name(name), Ok(()), "{name}");
        }
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert_eq!(validate_profile_name(""), Err(NameError::Empty));
        assert_eq!(validate_profile_name("  \t"), Err(NameError::Empty));
    }

    #[test]
    fn rejects_traversal_sequences() {
        for name in ["..", "a..b", "a/b", "a\\b", "../etc"] {
            assert_eq!(
                validate_profile_name(name),
                Err(NameError::PathTraversal),
                "{name}"
            );
        }
    }

    #[test]
    fn rejects_forbidden_and_control_characters() {
        for ch in ['<', '>', ':', '"', '|', '?', '*', '\u{0}', '\n', '\u{1f}'] {
            let name = format!("bad{ch}name");
            assert_eq!(
                validate_profile_name(&name),
                Err(NameError::ForbiddenChar(ch)),
                "{name:?}"
            );
        }
    }

    #[test]
    fn rejects_reserved_device_names_case_insensitively() {
        for name in ["CON", "con", "Nul", "com1", "LPT9", "aux"] {
            assert!(
                matches!(validate_profile_name(name), Err(NameError::Reserved(_))),
                "{name}"
            );
        }
    }
}
