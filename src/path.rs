//! Project-relative path handling.
//!
//! Every path that crosses a store boundary (file table, baseline_fp,
//! coverage_index) is stored as a forward-slash relative path with no
//! leading slash and no `..` segments, regardless of host OS. This module
//! is the single place that enforces that shape.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Converts an absolute (or root-relative) path into the canonical relative
/// form used as a store key.
pub fn to_relative(root: &Path, abs: &Path) -> Result<String> {
    let rel = abs.strip_prefix(root).map_err(|_| {
        EngineError::InvalidArgument(format!(
            "{} is not under project root {}",
            abs.display(),
            root.display()
        ))
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            std::path::Component::Normal(os) => {
                parts.push(os.to_string_lossy().into_owned());
            }
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                return Err(EngineError::InvalidArgument(format!(
                    "path escapes project root: {}",
                    abs.display()
                )));
            }
            _ => {
                return Err(EngineError::InvalidArgument(format!(
                    "unsupported path component in {}",
                    abs.display()
                )));
            }
        }
    }

    Ok(parts.join("/"))
}

/// Resolves a store-relative filename back to an absolute path under root.
pub fn to_absolute(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.replace('/', std::path::MAIN_SEPARATOR_STR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_strips_root_and_normalizes_slashes() {
        let root = Path::new("/proj");
        let abs = Path::new("/proj/src/lib.rs");
        assert_eq!(to_relative(root, abs).unwrap(), "src/lib.rs");
    }

    #[test]
    fn relative_rejects_escaping_paths() {
        let root = Path::new("/proj/crate");
        let abs = Path::new("/proj/other/lib.rs");
        assert!(to_relative(root, abs).is_err());
    }

    #[test]
    fn absolute_roundtrips() {
        let root = Path::new("/proj");
        let rel = "src/lib.rs";
        let abs = to_absolute(root, rel);
        assert_eq!(to_relative(root, &abs).unwrap(), rel);
    }
}
