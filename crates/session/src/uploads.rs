use std::path::Path;

use shared::domain::DuplicateUploads;

pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["pdf", "txt", "csv", "docx", "md", "html", "json"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    allowed_extensions: Vec<String>,
    pub duplicates: DuplicateUploads,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_EXTENSIONS.iter().copied(),
            DuplicateUploads::default(),
        )
    }
}

impl UploadPolicy {
    /// Extensions are stored lowercase without a leading dot, so `".PDF"`
    /// and `"pdf"` configure the same entry.
    pub fn new<I, S>(allowed_extensions: I, duplicates: DuplicateUploads) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed_extensions: Vec<String> = allowed_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        allowed_extensions.sort();
        allowed_extensions.dedup();
        Self {
            allowed_extensions,
            duplicates,
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn allows(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}
