//! Installer resources file system
//!
//! The installer resources (charts, default `config.yaml`, values template) are
//! compiled into the binary as a gzip tarball. `ChartFs` reads them from that
//! tarball or from a directory tree, and optionally overlays a local base
//! directory whose files take precedence on `read`.

use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::chart::{BufferedFile, CHART_FILE, Chart};
use crate::constants::CHARTS_DIR;
use crate::error::{CoreError, Result};

/// The installer resources tarball, produced by the build script
pub static EMBEDDED_TARBALL: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/installer.tar.gz"));

/// Kind of an installer resource entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File { data: Vec<u8> },
    Symlink { target: PathBuf },
    /// Entry types the installer does not handle (devices, fifos, hard links)
    Unsupported { type_name: String },
}

/// A single installer resource, path relative to the resources root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerEntry {
    pub path: String,
    pub mode: u32,
    pub kind: EntryKind,
}

impl InstallerEntry {
    pub fn size(&self) -> u64 {
        match &self.kind {
            EntryKind::File { data } => data.len() as u64,
            _ => 0,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }
}

/// Outcome of extracting a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Directory(PathBuf),
    File(PathBuf),
    Symlink { path: PathBuf, target: PathBuf },
    /// Existing symlink already pointing at the expected target
    SymlinkUnchanged(PathBuf),
    Skipped { path: PathBuf, reason: String },
}

/// Read-only view of the installer resources
#[derive(Debug, Clone)]
pub struct ChartFs {
    entries: BTreeMap<String, InstallerEntry>,
    overlay: Option<PathBuf>,
}

impl ChartFs {
    /// Resources compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::from_tarball(EMBEDDED_TARBALL)
    }

    /// Resources from a gzip compressed tarball
    pub fn from_tarball(bytes: &[u8]) -> Result<Self> {
        let embedded_err = |e: std::io::Error| CoreError::EmbeddedFiles {
            message: e.to_string(),
        };

        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut entries = BTreeMap::new();

        for entry in archive.entries().map_err(embedded_err)? {
            let mut entry = entry.map_err(embedded_err)?;
            let raw_path = entry.path().map_err(embedded_err)?.to_path_buf();
            let Some(path) = normalize(&raw_path) else {
                continue;
            };
            let mode = entry.header().mode().unwrap_or(0o644);
            let entry_type = entry.header().entry_type();

            let kind = if entry_type.is_dir() {
                EntryKind::Dir
            } else if entry_type.is_file() {
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data).map_err(embedded_err)?;
                EntryKind::File { data }
            } else if entry_type.is_symlink() {
                let target = entry
                    .link_name()
                    .map_err(embedded_err)?
                    .map(|t| t.to_path_buf())
                    .unwrap_or_default();
                EntryKind::Symlink { target }
            } else {
                EntryKind::Unsupported {
                    type_name: format!("{entry_type:?}"),
                }
            };
            entries.insert(path.clone(), InstallerEntry { path, mode, kind });
        }

        Ok(Self {
            entries,
            overlay: None,
        })
    }

    /// Resources from a directory tree on disk
    pub fn from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CoreError::FileNotFound {
                path: root.display().to_string(),
            });
        }

        let mut entries = BTreeMap::new();
        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| CoreError::FileNotFound {
                    path: e.to_string(),
                })?;
            let Some(path) = normalize(rel) else {
                continue;
            };
            let metadata = entry.path().symlink_metadata()?;
            let file_type = metadata.file_type();

            let kind = if file_type.is_symlink() {
                EntryKind::Symlink {
                    target: std::fs::read_link(entry.path())?,
                }
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File {
                    data: std::fs::read(entry.path())?,
                }
            } else {
                EntryKind::Unsupported {
                    type_name: format!("{file_type:?}"),
                }
            };
            entries.insert(
                path.clone(),
                InstallerEntry {
                    path,
                    mode: file_mode(&metadata),
                    kind,
                },
            );
        }

        Ok(Self {
            entries,
            overlay: None,
        })
    }

    /// Files found in `dir` take precedence over the resources on `read`.
    pub fn with_overlay<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.overlay = Some(dir.into());
        self
    }

    /// Read a file, trying the overlay directory first
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        if let Some(base) = &self.overlay {
            let local = base.join(name);
            match std::fs::read(&local) {
                Ok(data) => {
                    tracing::debug!(path = %local.display(), "read from local overlay");
                    return Ok(data);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.read_resource(name)
    }

    /// Read a file from the resources, symlinks resolved
    fn read_resource(&self, name: &str) -> Result<Vec<u8>> {
        let not_found = || CoreError::FileNotFound {
            path: name.to_string(),
        };
        let mut path = normalize(Path::new(name)).ok_or_else(not_found)?;

        // Bounded to avoid looping on symlink cycles
        for _ in 0..16 {
            let entry = self.entries.get(&path).ok_or_else(not_found)?;
            match &entry.kind {
                EntryKind::File { data } => return Ok(data.clone()),
                EntryKind::Symlink { target } => {
                    let parent = Path::new(&path).parent().unwrap_or(Path::new(""));
                    path = normalize(&parent.join(target)).ok_or_else(not_found)?;
                }
                _ => return Err(not_found()),
            }
        }
        Err(not_found())
    }

    /// Load the chart rooted at `path`, e.g. `charts/tssc-openshift`
    pub fn load_chart(&self, path: &str) -> Result<Chart> {
        let root = normalize(Path::new(path)).ok_or_else(|| CoreError::FileNotFound {
            path: path.to_string(),
        })?;
        let prefix = format!("{root}/");

        let mut files = Vec::new();
        for entry in self.entries.values() {
            let Some(rel) = entry.path.strip_prefix(&prefix) else {
                continue;
            };
            match &entry.kind {
                EntryKind::File { data } => files.push(BufferedFile::new(rel, data.clone())),
                EntryKind::Symlink { .. } => match self.read_resource(&entry.path) {
                    Ok(data) => files.push(BufferedFile::new(rel, data)),
                    Err(_) => tracing::warn!(path = %entry.path, "skipping dangling symlink"),
                },
                _ => {}
            }
        }

        if files.is_empty() {
            return Err(CoreError::FileNotFound { path: root });
        }
        Chart::load_files(&root, files)
    }

    /// Load every chart under `charts/`, sorted by directory name
    pub fn load_all(&self) -> Result<Vec<Chart>> {
        let prefix = format!("{CHARTS_DIR}/");
        let mut charts = Vec::new();

        for entry in self.entries.values() {
            let Some(rest) = entry.path.strip_prefix(&prefix) else {
                continue;
            };
            let Some(dir) = rest.strip_suffix(&format!("/{CHART_FILE}")) else {
                continue;
            };
            // Only direct children of charts/
            if dir.contains('/') {
                continue;
            }
            charts.push(self.load_chart(&format!("{CHARTS_DIR}/{dir}"))?);
        }

        tracing::debug!(count = charts.len(), "loaded charts");
        Ok(charts)
    }

    /// All entries, sorted by path
    pub fn entries(&self) -> impl Iterator<Item = &InstallerEntry> {
        self.entries.values()
    }

    /// Extract every entry into `dest`, which must be an existing directory.
    ///
    /// Existing symlinks pointing at the expected target are left untouched,
    /// mismatched ones are replaced. Unsupported entry types are skipped.
    pub fn extract<P: AsRef<Path>>(&self, dest: P) -> Result<Vec<Extracted>> {
        let dest = dest.as_ref();
        if !dest.is_dir() {
            return Err(CoreError::FileNotFound {
                path: dest.display().to_string(),
            });
        }

        let mut outcome = Vec::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            let target = dest.join(&entry.path);
            let result = match &entry.kind {
                EntryKind::Dir => {
                    std::fs::create_dir_all(&target)?;
                    Extracted::Directory(target)
                }
                EntryKind::File { data } => {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, data)?;
                    set_mode(&target, entry.mode)?;
                    Extracted::File(target)
                }
                EntryKind::Symlink { target: link } => extract_symlink(&target, link)?,
                EntryKind::Unsupported { type_name } => {
                    tracing::warn!(path = %entry.path, type_name, "unsupported entry type");
                    Extracted::Skipped {
                        path: target,
                        reason: format!("unsupported type: {type_name}"),
                    }
                }
            };
            outcome.push(result);
        }
        Ok(outcome)
    }
}

#[cfg(unix)]
fn extract_symlink(path: &Path, link: &Path) -> Result<Extracted> {
    if let Ok(existing) = std::fs::read_link(path) {
        if existing == link {
            return Ok(Extracted::SymlinkUnchanged(path.to_path_buf()));
        }
        std::fs::remove_file(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(link, path)?;
    Ok(Extracted::Symlink {
        path: path.to_path_buf(),
        target: link.to_path_buf(),
    })
}

#[cfg(not(unix))]
fn extract_symlink(path: &Path, _link: &Path) -> Result<Extracted> {
    Ok(Extracted::Skipped {
        path: path.to_path_buf(),
        reason: "symlinks are not supported on this platform".to_string(),
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.is_dir() { 0o755 } else { 0o644 }
}

/// Normalize a relative path into a `/` separated key. Returns `None` for
/// the root itself or paths escaping it.
fn normalize(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
