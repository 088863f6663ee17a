//! Avatar image catalog.
//!
//! Avatars are image files in a single directory; an avatar's name is its
//! file stem (`喜び.png` is `喜び`).

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Name of the avatar shown when nothing else is selected.
pub const DEFAULT_AVATAR: &str = "default";

/// Recognized image extensions, lowercase.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Lookup over an avatar image directory.
#[derive(Debug, Clone)]
pub struct AvatarCatalog {
    dir: PathBuf,
}

impl AvatarCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Avatar names, sorted, with `default` first when present.
    ///
    /// A missing or unreadable directory yields `["default"]`; an existing
    /// directory with no images yields an empty list.
    pub async fn available(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "Avatar directory not readable");
                return vec![DEFAULT_AVATAR.to_string()];
            }
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if let Some(name) = avatar_name(&entry.path()) {
                        names.push(name);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Failed to read avatar entry");
                    break;
                }
            }
        }

        names.sort();
        names.dedup();
        if let Some(pos) = names.iter().position(|n| n == DEFAULT_AVATAR) {
            let default = names.remove(pos);
            names.insert(0, default);
        }
        names
    }

    /// Image bytes for `name`.
    ///
    /// `name` may be a bare stem or a file name with extension. Returns
    /// `None` (and logs) when no matching image exists.
    pub async fn image(&self, name: &str) -> Option<Vec<u8>> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            warn!(avatar = %name, "Rejected avatar name");
            return None;
        }

        for candidate in self.candidates(name) {
            match tokio::fs::read(&candidate).await {
                Ok(bytes) => return Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "Failed to read avatar image");
                    return None;
                }
            }
        }

        warn!(avatar = %name, dir = %self.dir.display(), "Avatar image not found");
        None
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let direct = self.dir.join(name);
        if avatar_name(&direct).is_some() {
            return vec![direct];
        }
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{name}.{ext}")))
            .collect()
    }
}

/// Stem of `path` if it has an image extension.
fn avatar_name(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str, bytes: &[u8]) {
        std::fs::write(dir.path().join(name), bytes).unwrap();
    }

    #[tokio::test]
    async fn test_available_sorted_default_first() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "喜び.png", b"a");
        touch(&dir, "default.png", b"b");
        touch(&dir, "angry.webp", b"c");
        touch(&dir, "notes.txt", b"d");
        touch(&dir, "Sad.JPG", b"e");

        let catalog = AvatarCatalog::new(dir.path());
        assert_eq!(
            catalog.available().await,
            vec!["default", "Sad", "angry", "喜び"]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_yields_default() {
        let dir = TempDir::new().unwrap();
        let catalog = AvatarCatalog::new(dir.path().join("nope"));
        assert_eq!(catalog.available().await, vec!["default"]);
    }

    #[tokio::test]
    async fn test_empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "readme.md", b"x");
        let catalog = AvatarCatalog::new(dir.path());
        assert!(catalog.available().await.is_empty());
    }

    #[tokio::test]
    async fn test_image_by_stem_or_file_name() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "default.gif", b"GIF89a");
        let catalog = AvatarCatalog::new(dir.path());

        assert_eq!(catalog.image("default").await.as_deref(), Some(&b"GIF89a"[..]));
        assert_eq!(catalog.image("default.gif").await.as_deref(), Some(&b"GIF89a"[..]));
        assert_eq!(catalog.image("missing").await, None);
        assert_eq!(catalog.image("../default.gif").await, None);
    }
}
