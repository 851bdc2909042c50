use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::citations::display_name;
use crate::commands::Category;

const LISTING_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub display_name: String,
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryListing {
    MissingFolder,
    Empty,
    Documents(Vec<DocumentEntry>),
}

/// PDF collection on disk, addressed by paths relative to its root.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pdf_files(&self) -> Vec<DocumentEntry> {
        let mut entries: Vec<DocumentEntry> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_pdf(entry.path()))
            .filter_map(|entry| self.entry_for(entry.path()))
            .collect();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        entries
    }

    /// Maps a citation display name back to a downloadable file.
    pub fn resolve(&self, citation_name: &str) -> Option<DocumentEntry> {
        self.pdf_files()
            .into_iter()
            .find(|entry| entry.display_name == citation_name)
    }

    pub fn list_category(&self, category: Category) -> Result<CategoryListing> {
        let folder = self.root.join(category.folder());
        if !folder.is_dir() {
            return Ok(CategoryListing::MissingFolder);
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&folder)
            .with_context(|| format!("failed to read {}", folder.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_pdf(&path) {
                if let Some(entry) = self.entry_for(&path) {
                    entries.push(entry);
                }
            }
        }

        if entries.is_empty() {
            return Ok(CategoryListing::Empty);
        }
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        entries.truncate(LISTING_LIMIT);
        Ok(CategoryListing::Documents(entries))
    }

    /// Absolute path for a relative path taken from callback data.
    pub fn open(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if relative_path.is_empty() || !safe {
            anyhow::bail!("refusing document path outside the collection: {relative_path}");
        }

        let path = self.root.join(relative);
        if !path.is_file() {
            anyhow::bail!("document does not exist: {relative_path}");
        }
        Ok(path)
    }

    fn entry_for(&self, path: &Path) -> Option<DocumentEntry> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let relative_path = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let file_name = path.file_name()?.to_string_lossy();
        Some(DocumentEntry {
            display_name: display_name(&file_name),
            relative_path,
        })
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(files: &[&str]) -> (tempfile::TempDir, DocumentStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, b"%PDF-1.4").expect("write");
        }
        let store = DocumentStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn finds_pdfs_recursively() {
        let (_dir, store) = store_with(&[
            "UX_Research/Personas_101.pdf",
            "UI_Patterns/deep/Buttons.PDF",
            "notes.txt",
        ]);

        let paths: Vec<_> = store
            .pdf_files()
            .into_iter()
            .map(|entry| entry.relative_path)
            .collect();
        assert_eq!(
            paths,
            vec!["UI_Patterns/deep/Buttons.PDF", "UX_Research/Personas_101.pdf"]
        );
    }

    #[test]
    fn resolves_citation_names_to_files() {
        let (_dir, store) = store_with(&["UX_Research/Personas_101.pdf"]);

        let entry = store.resolve("Personas 101").expect("resolved");
        assert_eq!(entry.relative_path, "UX_Research/Personas_101.pdf");
        assert!(store.resolve("Unknown Doc").is_none());
    }

    #[test]
    fn lists_category_folders() {
        let (_dir, store) = store_with(&["Case_Studies/Airbnb.pdf", "Accessibility/readme.md"]);

        match store.list_category(Category::CaseStudies).expect("listing") {
            CategoryListing::Documents(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].display_name, "Airbnb");
            }
            other => panic!("unexpected listing {other:?}"),
        }
        assert_eq!(
            store.list_category(Category::Accessibility).expect("listing"),
            CategoryListing::Empty
        );
        assert_eq!(
            store.list_category(Category::Prototyping).expect("listing"),
            CategoryListing::MissingFolder
        );
    }

    #[test]
    fn open_rejects_escaping_paths() {
        let (_dir, store) = store_with(&["UX_Research/Personas_101.pdf"]);

        assert!(store.open("UX_Research/Personas_101.pdf").is_ok());
        assert!(store.open("../etc/passwd").is_err());
        assert!(store.open("/etc/passwd").is_err());
        assert!(store.open("UX_Research/missing.pdf").is_err());
    }
}
