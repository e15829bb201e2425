//! Local image folder scanning for the demo backend.

use std::io;
use std::path::Path;

/// Supported image extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp"];

/// Check if a filename (string) has a supported image extension.
pub fn is_image_filename(name: &str) -> bool {
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Names of the image files directly inside `folder`, in capture order.
///
/// Survey cameras number their frames, so name order is capture order.
pub fn list_image_files(folder: &Path) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_image_filename(name))
        .collect();
    names.sort();
    log::debug!("Found {} images in {:?}", names.len(), folder);
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_filename() {
        assert!(is_image_filename("IMG_0001.JPG"));
        assert!(is_image_filename("frame.tif"));
        assert!(!is_image_filename("track.csv"));
        assert!(!is_image_filename("jpg"));
    }

    #[test]
    fn test_list_image_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_002.jpg", "a_001.jpg", "notes.txt", "c_003.PNG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let names = list_image_files(dir.path()).unwrap();
        assert_eq!(names, vec!["a_001.jpg", "b_002.jpg", "c_003.PNG"]);
    }
}
