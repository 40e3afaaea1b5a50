//! Local file-tree abstraction.
//!
//! The reconciliation engine never touches `std::fs` directly; it goes
//! through the [`FileTree`] trait so the host integration (CLI, tests, or a
//! desktop application) decides how files are actually stored. Paths are
//! relative, forward-slash separated, and may contain directory separators.

use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// A file visible in the tree enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    /// Relative, forward-slash separated path.
    pub path: String,
    /// Extension without the leading dot, lowercased. Empty if none.
    pub extension: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

/// Contract the engine consumes for local file access.
///
/// Folder creation is idempotent, and a single file write is atomic from
/// the engine's perspective.
pub trait FileTree {
    /// Read a file's content as UTF-8 text.
    fn read(&self, path: &str) -> io::Result<String>;

    /// `true` if the path exists.
    fn exists(&self, path: &str) -> bool;

    /// Create a file with the given content, creating parent folders as
    /// needed. Fails if the file already exists.
    fn create(&self, path: &str, content: &str) -> io::Result<()>;

    /// Overwrite an existing file's content, creating it (and parent
    /// folders) if absent.
    fn modify(&self, path: &str, content: &str) -> io::Result<()>;

    /// Create a folder and any missing parents. No-op if it already exists.
    fn create_folder(&self, path: &str) -> io::Result<()>;

    /// Delete a file. No-op if absent.
    fn remove(&self, path: &str) -> io::Result<()>;

    /// Enumerate all files in the tree.
    fn list(&self) -> io::Result<Vec<TreeEntry>>;
}

// ---------------------------------------------------------------------------
// LocalFileTree
// ---------------------------------------------------------------------------

/// [`FileTree`] implementation over a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileTree {
    root: PathBuf,
}

impl LocalFileTree {
    /// Create a tree rooted at `root`. The directory is created if missing.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of this tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside the root, rejecting traversal
    /// components so a remote snapshot cannot write outside the tree.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let rel = Path::new(path);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path '{path}' escapes the tree root"),
                    ));
                }
            }
        }
        Ok(self.root.join(rel))
    }

    fn walk(&self, dir: &Path, entries: &mut Vec<TreeEntry>) -> io::Result<()> {
        for item in std::fs::read_dir(dir)? {
            let item = item?;
            let path = item.path();
            let file_type = item.file_type()?;
            if file_type.is_dir() {
                self.walk(&path, entries)?;
            } else if file_type.is_file() {
                let metadata = item.metadata()?;
                let rel = path
                    .strip_prefix(&self.root)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                let rel_str = rel
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");
                let extension = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let modified_at = match metadata.modified() {
                    Ok(mtime) => DateTime::<Utc>::from(mtime),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "no modification time, using now");
                        Utc::now()
                    }
                };
                entries.push(TreeEntry {
                    path: rel_str,
                    extension,
                    size: metadata.len(),
                    modified_at,
                });
            }
        }
        Ok(())
    }
}

impl FileTree for LocalFileTree {
    fn read(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.resolve(path)?)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn create(&self, path: &str, content: &str) -> io::Result<()> {
        let full = self.resolve(path)?;
        if full.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file '{path}' already exists"),
            ));
        }
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path, "creating file");
        std::fs::write(full, content)
    }

    fn modify(&self, path: &str, content: &str) -> io::Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, content)
    }

    fn create_folder(&self, path: &str) -> io::Result<()> {
        std::fs::create_dir_all(self.resolve(path)?)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let full = self.resolve(path)?;
        if full.exists() {
            std::fs::remove_file(full)
        } else {
            Ok(())
        }
    }

    fn list(&self) -> io::Result<Vec<TreeEntry>> {
        let mut entries = Vec::new();
        self.walk(&self.root.clone(), &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (tempfile::TempDir, LocalFileTree) {
        let dir = tempfile::tempdir().unwrap();
        let tree = LocalFileTree::new(dir.path()).unwrap();
        (dir, tree)
    }

    #[test]
    fn test_create_read_modify_remove() {
        let (_dir, tree) = tree();
        tree.create("notes/a.md", "hello").unwrap();
        assert!(tree.exists("notes/a.md"));
        assert_eq!(tree.read("notes/a.md").unwrap(), "hello");

        tree.modify("notes/a.md", "updated").unwrap();
        assert_eq!(tree.read("notes/a.md").unwrap(), "updated");

        tree.remove("notes/a.md").unwrap();
        assert!(!tree.exists("notes/a.md"));
        // Removing again is a no-op.
        tree.remove("notes/a.md").unwrap();
    }

    #[test]
    fn test_create_fails_on_existing() {
        let (_dir, tree) = tree();
        tree.create("a.md", "x").unwrap();
        assert!(tree.create("a.md", "y").is_err());
    }

    #[test]
    fn test_folder_creation_is_idempotent() {
        let (_dir, tree) = tree();
        tree.create_folder("x/y/z").unwrap();
        tree.create_folder("x/y/z").unwrap();
    }

    #[test]
    fn test_list_reports_relative_paths_and_extensions() {
        let (_dir, tree) = tree();
        tree.create("a.md", "1").unwrap();
        tree.create("sub/b.TXT", "22").unwrap();

        let entries = tree.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "a.md");
        assert_eq!(entries[0].extension, "md");
        assert_eq!(entries[0].size, 1);
        assert_eq!(entries[1].path, "sub/b.TXT");
        assert_eq!(entries[1].extension, "txt");
    }

    #[test]
    fn test_rejects_path_traversal() {
        let (_dir, tree) = tree();
        assert!(tree.read("../outside.md").is_err());
        assert!(tree.create("../outside.md", "x").is_err());
        assert!(!tree.exists("../outside.md"));
    }
}
