//! File discovery for indexing runs.
//!
//! Traversal respects gitignore rules plus a project-local
//! `.semdexignore` file, then filters by configured extension and size.

use crate::Settings;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::config::DATA_DIR;

/// Walks directories to find files eligible for indexing.
#[derive(Debug, Clone)]
pub struct FileWalker {
    settings: Arc<Settings>,
}

impl FileWalker {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Walk `root` and yield eligible files.
    ///
    /// Unreadable entries are skipped silently; the data directory is
    /// always excluded so the index never indexes itself.
    pub fn walk(&self, root: &Path) -> impl Iterator<Item = PathBuf> + use<> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false);

        builder.add_custom_ignore_filename(".semdexignore");

        // Leading '!' inverts an override glob into an exclusion
        let mut overrides = OverrideBuilder::new(root);
        let _ = overrides.add(&format!("!{DATA_DIR}/**"));
        for pattern in &self.settings.indexing.ignore_patterns {
            if overrides.add(&format!("!{pattern}")).is_err() {
                warn!("ignoring invalid ignore pattern: {pattern}");
            }
        }
        match overrides.build() {
            Ok(ov) => {
                builder.overrides(ov);
            }
            Err(e) => warn!("failed to build ignore overrides: {e}"),
        }

        let extensions = self.settings.indexing.extensions.clone();
        let max_size = self.settings.indexing.max_file_size_bytes;

        builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(move |entry| {
                let path = entry.path();

                let ext = path.extension().and_then(|e| e.to_str())?;
                if !extensions.iter().any(|allowed| allowed == ext) {
                    return None;
                }

                if let Ok(meta) = entry.metadata()
                    && meta.len() > max_size
                {
                    return None;
                }

                Some(path.to_path_buf())
            })
    }

}
