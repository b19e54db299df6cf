//! Folder/file navigation state for a deck.
//!
//! The music library is a flat list of folders (each directory under the
//! root that contains at least one audio file), with a folder cursor and a
//! file cursor per deck. Scanning happens once at startup; the navigation
//! gestures only ever move the cursors.

use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::info;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "flac", "wav", "m4a", "aac", "aiff"];

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
}

/// One folder's worth of playable files, sorted by name.
#[derive(Debug)]
pub struct Folder {
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Per-deck navigation cursor over the scanned library.
#[derive(Debug, Default)]
pub struct NavState {
    folders: Vec<Folder>,
    folder_idx: usize,
    file_idx: usize,
    pub files_present: bool,
}

impl NavState {
    /// Scan `root` for folders containing audio files.
    pub fn scan(root: &Path) -> Self {
        let mut folders: Vec<Folder> = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let mut files: Vec<PathBuf> = std::fs::read_dir(entry.path())
                .into_iter()
                .flatten()
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_audio_file(p))
                .collect();
            if files.is_empty() {
                continue;
            }
            files.sort();
            folders.push(Folder {
                path: entry.path().to_path_buf(),
                files,
            });
        }

        folders.sort_by(|a, b| a.path.cmp(&b.path));
        let files_present = !folders.is_empty();
        info!(
            "library scan of {}: {} folders, {} files",
            root.display(),
            folders.len(),
            folders.iter().map(|f| f.files.len()).sum::<usize>()
        );

        Self {
            folders,
            folder_idx: 0,
            file_idx: 0,
            files_present,
        }
    }

    fn folder(&self) -> Option<&Folder> {
        self.folders.get(self.folder_idx)
    }

    /// The file under the cursor.
    pub fn current_file(&self) -> Option<&Path> {
        self.folder()?.files.get(self.file_idx).map(PathBuf::as_path)
    }

    /// Move to the next file in the folder, wrapping.
    pub fn next_file(&mut self) -> Option<&Path> {
        let count = self.folder()?.files.len();
        self.file_idx = (self.file_idx + 1) % count;
        self.current_file()
    }

    /// Move to the previous file in the folder, wrapping.
    pub fn prev_file(&mut self) -> Option<&Path> {
        let count = self.folder()?.files.len();
        self.file_idx = (self.file_idx + count - 1) % count;
        self.current_file()
    }

    /// Jump to a random file anywhere in the library.
    pub fn random_file(&mut self) -> Option<&Path> {
        if self.folders.is_empty() {
            return None;
        }
        let mut rng = rand::rng();
        self.folder_idx = rng.random_range(0..self.folders.len());
        let count = self.folders[self.folder_idx].files.len();
        self.file_idx = rng.random_range(0..count);
        self.current_file()
    }

    /// Move to the first file of the next folder, wrapping.
    pub fn next_folder(&mut self) -> Option<&Path> {
        if self.folders.is_empty() {
            return None;
        }
        self.folder_idx = (self.folder_idx + 1) % self.folders.len();
        self.file_idx = 0;
        self.current_file()
    }

    /// Move to the first file of the previous folder, wrapping.
    pub fn prev_folder(&mut self) -> Option<&Path> {
        if self.folders.is_empty() {
            return None;
        }
        self.folder_idx = (self.folder_idx + self.folders.len() - 1) % self.folders.len();
        self.file_idx = 0;
        self.current_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, NavState) {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("one.mp3"), b"x").unwrap();
        std::fs::write(a.join("two.mp3"), b"x").unwrap();
        std::fs::write(b.join("three.ogg"), b"x").unwrap();
        std::fs::write(b.join("notes.txt"), b"x").unwrap();
        let nav = NavState::scan(dir.path());
        (dir, nav)
    }

    #[test]
    fn test_scan_finds_audio_folders() {
        let (_dir, nav) = fixture();
        assert!(nav.files_present);
        assert_eq!(nav.folders.len(), 2);
        assert_eq!(nav.folders[1].files.len(), 1);
    }

    #[test]
    fn test_file_cursor_wraps() {
        let (_dir, mut nav) = fixture();
        let first = nav.current_file().unwrap().to_path_buf();
        nav.next_file();
        nav.next_file();
        assert_eq!(nav.current_file().unwrap(), first.as_path());
        nav.prev_file();
        nav.prev_file();
        assert_eq!(nav.current_file().unwrap(), first.as_path());
    }

    #[test]
    fn test_folder_cursor_resets_file() {
        let (_dir, mut nav) = fixture();
        nav.next_file();
        nav.next_folder();
        assert!(nav.current_file().unwrap().ends_with("three.ogg"));
        nav.prev_folder();
        assert!(nav.current_file().unwrap().ends_with("one.mp3"));
    }

    #[test]
    fn test_empty_library() {
        let dir = tempfile::tempdir().unwrap();
        let mut nav = NavState::scan(dir.path());
        assert!(!nav.files_present);
        assert!(nav.current_file().is_none());
        assert!(nav.random_file().is_none());
    }
}
