//! Project and module name handling.

use std::path::Path;

use crate::creator::Variant;
use crate::error::{Result, ScaffoldError};

/// Normalize free-form input into a directory and package name.
///
/// Lowercases, keeps ASCII alphanumerics, `.` and `_`, and collapses every
/// other run of characters into a single `-`.
pub fn slugify_name(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Check that `name` can be created under `parent`.
///
/// The directory check is advisory: nothing stops another process from
/// creating the directory afterwards.
pub fn validate_project_name(name: &str, parent: &Path, variant: Variant) -> Result<()> {
    let noun = variant.noun();
    if name.trim().is_empty() {
        return Err(ScaffoldError::InvalidName(format!(
            "Please enter a {noun} name"
        )));
    }
    if name.contains('.') {
        return Err(ScaffoldError::InvalidName(format!(
            "Project names cannot contain a dot (.) character. Please enter a different {noun} name."
        )));
    }
    if name.contains(['/', '\\']) || Path::new(name).is_absolute() {
        return Err(ScaffoldError::InvalidName(format!(
            "Project names cannot contain path separators. Please enter a different {noun} name."
        )));
    }
    if parent.join(name).is_dir() {
        return Err(ScaffoldError::InvalidName(format!(
            "A directory already exists with the name {name}. Please enter a different {noun} name."
        )));
    }
    Ok(())
}

/// Slugify prompted input and validate the result.
pub fn normalize_prompted_name(input: &str, parent: &Path, variant: Variant) -> Result<String> {
    let slug = slugify_name(input);
    validate_project_name(&slug, parent, variant)?;
    Ok(slug)
}
