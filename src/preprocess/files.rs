use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

/// Read access to include and program files, addressed by `/`-separated paths.
pub trait FileSource {
    fn read(&self, path: &str) -> io::Result<String>;
}

/// Files below a directory on disk.
#[derive(Debug, Clone)]
pub struct DirFiles {
    base: PathBuf,
}

impl DirFiles {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl FileSource for DirFiles {
    fn read(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.base.join(path.trim_start_matches('/')))
    }
}

/// In-memory file table.
#[derive(Debug, Clone, Default)]
pub struct MemoryFiles {
    files: HashMap<String, String>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<String>) {
        self.files.insert(normalize_path(path), contents.into());
    }
}

impl FileSource for MemoryFiles {
    fn read(&self, path: &str) -> io::Result<String> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_owned()))
    }
}

/// Resolves `path` against `dir` unless it is absolute, then folds `.` and `..` segments.
pub(crate) fn resolve_path(dir: &str, path: &str) -> String {
    if path.starts_with('/') || dir.is_empty() {
        normalize_path(path)
    } else {
        normalize_path(&format!("{dir}/{path}"))
    }
}

pub(crate) fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => path[..i].to_owned(),
        None => String::new(),
    }
}

pub(crate) fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_directory() {
        assert_eq!(resolve_path("shaders/lib", "light.xml"), "shaders/lib/light.xml");
        assert_eq!(resolve_path("shaders/lib", "../common.xml"), "shaders/common.xml");
        assert_eq!(resolve_path("shaders/lib", "/abs/x.xml"), "abs/x.xml");
        assert_eq!(parent_dir("a/b/c.xml"), "a/b");
        assert_eq!(parent_dir("c.xml"), "");
    }

    #[test]
    fn memory_files_match_normalized_paths() {
        let f = MemoryFiles::new().with_file("/lib/./a.xml", "<include/>");
        assert_eq!(f.read("lib/a.xml").unwrap(), "<include/>");
        assert_eq!(
            f.read("lib/b.xml").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
