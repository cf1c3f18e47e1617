use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// Find configuration files under `root`.
///
/// Returns every regular file whose extension equals `extension`
/// (case-insensitive), sorted by path. Unreadable directories and non UTF-8
/// names are logged and skipped. Symlinks are not followed.
pub fn discover(root: &Utf8Path, extension: &str, recursive: bool) -> Vec<Utf8PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut found: Vec<Utf8PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => Some(path),
            Err(path) => {
                tracing::warn!("Skipping non UTF-8 path: {}", path.display());
                None
            }
        })
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();

    found.sort();
    tracing::info!("Discovered {} .{} file(s) under {}", found.len(), extension, root);
    found
}
