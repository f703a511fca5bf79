//! Best-effort detection of dependency remappings next to a source file.

use std::path::Path;

/// How many directories are searched, starting with the source file's own.
const MAX_SEARCH_DEPTH: usize = 5;

/// Look for `node_modules/@openzeppelin` in the source file's directory and
/// its closest ancestors, and map `@openzeppelin/` to it.
///
/// Returns no remappings when nothing is found.
pub fn detect_remappings(source_file: &Path) -> Vec<String> {
    let Some(start) = source_file.parent() else {
        return Vec::new();
    };

    start
        .ancestors()
        .take(MAX_SEARCH_DEPTH)
        .map(|dir| dir.join("node_modules").join("@openzeppelin"))
        .find(|candidate| candidate.is_dir())
        .map(|oz_dir| {
            tracing::debug!(path = %oz_dir.display(), "Detected @openzeppelin remapping");
            vec![format!("@openzeppelin/={}/", oz_dir.display())]
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_detects_in_ancestor() {
        let temp_dir = TempDir::new("soldeploy-remap").expect("Failed to create temp dir");
        let oz_dir = temp_dir.path().join("node_modules/@openzeppelin");
        let contracts = temp_dir.path().join("contracts/tokens");
        std::fs::create_dir_all(&oz_dir).unwrap();
        std::fs::create_dir_all(&contracts).unwrap();

        let remappings = detect_remappings(&contracts.join("Token.sol"));

        assert_eq!(remappings, vec![format!("@openzeppelin/={}/", oz_dir.display())]);
    }

    #[test]
    fn test_nothing_found() {
        let temp_dir = TempDir::new("soldeploy-remap").expect("Failed to create temp dir");
        let remappings = detect_remappings(&temp_dir.path().join("Token.sol"));

        assert!(remappings.is_empty());
    }

    #[test]
    fn test_search_depth_is_bounded() {
        let temp_dir = TempDir::new("soldeploy-remap").expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("node_modules/@openzeppelin")).unwrap();
        let deep = temp_dir.path().join("a/b/c/d/e/f");
        std::fs::create_dir_all(&deep).unwrap();

        assert!(detect_remappings(&deep.join("Token.sol")).is_empty());
    }
}
