use std::collections::HashSet;
use std::fs;
use std::path::Path;

use domain::model::FileEntry;

/// Recursively lists regular files under `root`, skipping symlinks (file or directory) and any
/// entry whose file name is in `exceptions`. Synchronous: callers run this inside
/// `spawn_blocking`, it is only ever invoked once per job at start.
pub fn list_recursive(root: &Path, exceptions: &HashSet<String>) -> std::io::Result<Vec<FileEntry>> {
    let mut out = Vec::new();
    walk(root, exceptions, &mut out)?;
    Ok(out)
}

fn walk(dir: &Path, exceptions: &HashSet<String>, out: &mut Vec<FileEntry>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if exceptions.contains(name) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        let path = entry.path();
        if file_type.is_dir() {
            walk(&path, exceptions, out)?;
        } else if file_type.is_file() {
            let size = entry.metadata()?.len();
            let Some(path) = path.to_str() else { continue };
            out.push(FileEntry::new(path, size));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_nested_files_and_skips_exceptions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), b"world!").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"x").unwrap();

        let mut exceptions = HashSet::new();
        exceptions.insert(".DS_Store".to_string());

        let mut files = list_recursive(dir.path(), &exceptions).unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.path.ends_with("a.txt") && f.size == 5));
        assert!(files.iter().any(|f| f.path.ends_with("b.txt") && f.size == 6));
    }

    #[test]
    fn skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.txt");
        fs::write(&target, b"data").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, dir.path().join("link.txt")).unwrap();

        let files = list_recursive(dir.path(), &HashSet::new()).unwrap();
        #[cfg(unix)]
        assert_eq!(files.len(), 1);
    }
}
