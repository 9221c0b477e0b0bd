//! File System Abstraction
//!
//! Path normalisation, bundled resource lookup and plain file I/O.
//!
//! Paths beginning with `:/` name bundled resources (icons, fallback artwork) that ship
//! with the frontend; they are resolved against an ordered list of resource roots.

use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::{PlatformError, PlatformResult};

/// Prefix of bundled resource paths
pub const BUNDLED_PREFIX: &str = ":/";

/// True when `path` names a bundled resource
pub fn is_bundled(path: &str) -> bool {
    path.starts_with(BUNDLED_PREFIX)
}

/// Lower-cased extension of `path`, without the dot
pub fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Normalise a path so equivalent spellings produce the same key
///
/// Bundled paths are returned untouched. Relative paths that exist are made absolute
/// against the working directory; `.` and empty segments are dropped and `..` pops the
/// previous segment. Symlinks are not resolved. Separators are always `/`.
pub fn canonical_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if is_bundled(path) {
        return path.to_string();
    }

    let generic = path.replace('\\', "/");
    let candidate = Path::new(&generic);
    let absolute = if candidate.is_relative() && candidate.exists() {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(candidate),
            Err(_) => candidate.to_path_buf(),
        }
    } else {
        candidate.to_path_buf()
    };

    let mut prefix = String::new();
    let mut segments: Vec<String> = Vec::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().replace('\\', "/"),
            Component::RootDir => prefix.push('/'),
            Component::CurDir => {}
            Component::ParentDir => {
                segments.pop();
            }
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
        }
    }

    let joined = segments.join("/");
    if prefix.is_empty() {
        joined
    } else {
        format!("{prefix}{joined}")
    }
}

/// File open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Read only
    Read,
    /// Write only (creates or truncates)
    Write,
}

/// File handle for synchronous operations
pub struct FileHandle {
    path: PathBuf,
    file: std::fs::File,
}

impl FileHandle {
    /// Open a file with the specified mode
    pub fn open(path: impl AsRef<Path>, mode: FileMode) -> PlatformResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = match mode {
            FileMode::Read => std::fs::File::open(&path)?,
            FileMode::Write => std::fs::File::create(&path)?,
        };

        Ok(Self { path, file })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the entire file contents
    pub fn read_all(&mut self) -> PlatformResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.size()? as usize);
        self.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Write all of `data` and flush
    pub fn write_all(&mut self, data: &[u8]) -> PlatformResult<()> {
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    /// Get the file size
    pub fn size(&self) -> PlatformResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// File system rooted at the frontend's resource and cache directories
#[derive(Debug, Clone)]
pub struct FileSystem {
    /// Directories searched, in order, for bundled resources
    resource_roots: Vec<PathBuf>,
    /// Directory for generated files
    cache_dir: PathBuf,
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem {
    /// Create a file system using `./resources` and `./cache` under the working directory
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            resource_roots: vec![cwd.join("resources")],
            cache_dir: cwd.join("cache"),
        }
    }

    /// Create a file system with custom directories
    pub fn with_dirs(resource_roots: Vec<PathBuf>, cache_dir: PathBuf) -> Self {
        Self {
            resource_roots,
            cache_dir,
        }
    }

    /// Directories searched for bundled resources
    pub fn resource_roots(&self) -> &[PathBuf] {
        &self.resource_roots
    }

    /// Get the cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve a path relative to the cache directory
    pub fn cache_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.cache_dir.join(path)
    }

    /// Map a texture path to a file on disk
    ///
    /// Bundled paths resolve to the first resource root containing them and fail with
    /// [`PlatformError::ResourceNotFound`] when none does.
    pub fn resolve(&self, path: &str) -> PlatformResult<PathBuf> {
        let Some(relative) = path.strip_prefix(BUNDLED_PREFIX) else {
            return Ok(PathBuf::from(path));
        };

        self.resource_roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| PlatformError::ResourceNotFound(path.to_string()))
    }

    /// Read a texture path, bundled or not
    pub fn read(&self, path: &str) -> PlatformResult<Vec<u8>> {
        let resolved = self.resolve(path)?;
        if !resolved.is_file() {
            return Err(PlatformError::ResourceNotFound(path.to_string()));
        }
        FileHandle::open(&resolved, FileMode::Read)?.read_all()
    }

    /// Size of the file behind a texture path
    pub fn file_size(&self, path: &str) -> PlatformResult<u64> {
        Ok(std::fs::metadata(self.resolve(path)?)?.len())
    }

    /// Check if a texture path exists
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|file| file.exists())
    }

    /// Create the cache directory if needed
    pub fn ensure_cache_dir(&self) -> PlatformResult<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}
