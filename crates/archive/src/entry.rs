//! Entry listing and MIME guessing shared by every format adapter.

use manga_core::natural_sort;

/// One image page inside an archive, in natural-sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub uncompressed_size: Option<u64>,
}

const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// macOS writes these alongside real files inside archives it created;
/// they are never page content.
fn is_macos_noise(name: &str) -> bool {
    name.starts_with("__MACOSX/") || name.rsplit('/').next().is_some_and(|base| base.starts_with("._"))
}

fn extension_lower(name: &str) -> Option<String> {
    name.rsplit('.').next().map(|e| e.to_ascii_lowercase())
}

/// Whether `name` names a supported image (by extension) and is not a
/// directory entry or macOS metadata noise.
pub fn is_supported_image(name: &str, is_dir: bool) -> bool {
    if is_dir || is_macos_noise(name) {
        return false;
    }
    match extension_lower(name) {
        Some(ext) => SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// Guess the MIME type for an image entry from its extension, defaulting
/// to jpeg when the extension is absent or unrecognized.
pub fn guess_mime(name: &str) -> &'static str {
    match extension_lower(name).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Sort entries in natural order, per the page-indexing contract: page N
/// is the Nth entry after this ordering is applied.
pub fn sort_entries(entries: &mut [Entry]) {
    natural_sort::sort_by_key(entries, |e| e.name.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_macos_metadata() {
        assert!(is_macos_noise("__MACOSX/a.jpg"));
        assert!(is_macos_noise("folder/._page1.jpg"));
        assert!(!is_macos_noise("folder/page1.jpg"));
    }

    #[test]
    fn filters_unsupported_extensions() {
        assert!(is_supported_image("page1.jpg", false));
        assert!(!is_supported_image("notes.txt", false));
        assert!(!is_supported_image("folder", true));
    }

    #[test]
    fn guesses_mime_defaults_to_jpeg() {
        assert_eq!(guess_mime("a.png"), "image/png");
        assert_eq!(guess_mime("a.PNG"), "image/png");
        assert_eq!(guess_mime("a.weird"), "image/jpeg");
    }

    #[test]
    fn sorts_naturally() {
        let mut entries = vec![
            Entry { name: "10.jpg".into(), uncompressed_size: None },
            Entry { name: "2.jpg".into(), uncompressed_size: None },
            Entry { name: "1.jpg".into(), uncompressed_size: None },
        ];
        sort_entries(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["1.jpg", "2.jpg", "10.jpg"]);
    }
}
