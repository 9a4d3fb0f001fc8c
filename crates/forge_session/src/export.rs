//! Artifact export.
//!
//! Consumed artifacts are written under a project directory:
//!
//! ```text
//! <out>/
//! ├── index.html
//! ├── styles/main.css
//! └── ...
//! ```
//!
//! Artifact names come from a remote endpoint, so every name is checked to
//! stay inside the output directory before anything is written.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{SessionError, SessionResult};
use crate::types::{Artifact, SessionSnapshot};

/// Largest file picked up by [`load_existing_files`]
const MAX_EXISTING_FILE_BYTES: u64 = 512 * 1024;

/// Directories never sent back to the generator
const SKIPPED_DIRS: &[&str] = &[".git", ".forge", "node_modules", "target", "dist"];

/// Validate an artifact name and turn it into a relative path
pub fn safe_relative_path(name: &str) -> SessionResult<PathBuf> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidArtifactPath("empty name".to_string()));
    }

    let mut path = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return Err(SessionError::InvalidArtifactPath(name.to_string())),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(SessionError::InvalidArtifactPath(name.to_string()));
    }
    Ok(path)
}

/// Write artifacts under `out_dir`, returning the written paths.
///
/// All names are validated before the first write.
pub fn write_artifacts(out_dir: impl AsRef<Path>, artifacts: &[Artifact]) -> SessionResult<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    let relative: Vec<PathBuf> = artifacts
        .iter()
        .map(|a| safe_relative_path(&a.name))
        .collect::<SessionResult<_>>()?;

    let mut written = Vec::with_capacity(artifacts.len());
    for (artifact, rel) in artifacts.iter().zip(relative) {
        let full_path = out_dir.join(rel);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, &artifact.content)?;
        debug!("Wrote {}", full_path.display());
        written.push(full_path);
    }

    info!("Wrote {} artifacts to {}", written.len(), out_dir.display());
    Ok(written)
}

/// Language tag for a file name, by extension
pub fn language_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "html",
        "css" => "css",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "ts" => "typescript",
        "tsx" => "tsx",
        "json" => "json",
        "md" => "markdown",
        "py" => "python",
        "rs" => "rust",
        "svg" => "svg",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        _ => "text",
    }
}

/// Read a project directory back into artifacts, for modification builds.
///
/// Skips VCS and build directories, binary files and anything larger than
/// 512 KiB. Names use `/` separators relative to `root`.
pub fn load_existing_files(root: impl AsRef<Path>) -> SessionResult<Vec<Artifact>> {
    let root = root.as_ref();
    let mut artifacts = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|n| SKIPPED_DIRS.contains(&n))
        });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX) > MAX_EXISTING_FILE_BYTES {
            debug!("Skipping large file {}", entry.path().display());
            continue;
        }

        let Ok(content) = fs::read_to_string(entry.path()) else {
            debug!("Skipping non-text file {}", entry.path().display());
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        artifacts.push(Artifact::new(name, language_for_path(relative), content));
    }

    Ok(artifacts)
}

/// Save a session snapshot as pretty JSON
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &SessionSnapshot) -> SessionResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;
    Ok(())
}
