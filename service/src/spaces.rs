const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// Classifies a file by its last extension, lower-cased. Photo-style extensions land in both
/// the `drive` and `photos` spaces; everything else is `drive` only.
pub fn classify(path: &str) -> Vec<&'static str> {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext {
        Some(ext) if PHOTO_EXTENSIONS.contains(&ext.as_str()) => vec!["drive", "photos"],
        _ => vec!["drive"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_extensions_get_both_spaces() {
        for ext in PHOTO_EXTENSIONS {
            assert_eq!(classify(&format!("IMG_0345.{ext}")), vec!["drive", "photos"]);
            assert_eq!(classify(&format!("IMG_0345.{}", ext.to_uppercase())), vec!["drive", "photos"]);
        }
    }

    #[test]
    fn other_extensions_get_drive_only() {
        assert_eq!(classify("report.pdf"), vec!["drive"]);
        assert_eq!(classify("no_extension"), vec!["drive"]);
    }

    #[test]
    fn classifies_by_last_extension_only() {
        assert_eq!(classify("archive.jpg.zip"), vec!["drive"]);
    }
}
