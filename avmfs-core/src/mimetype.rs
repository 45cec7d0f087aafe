//! Content type guessing from file names.

/// Guesses a content type for a file name.
pub trait ContentTypeGuesser: Send + Sync {
    /// Returns `None` when the type is unknown.
    fn guess(&self, file_name: &str) -> Option<String>;
}

/// Guesses by file extension, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMimetypes;

const EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("csv", "text/csv"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/x-javascript"),
    ("xml", "text/xml"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("rtf", "application/rtf"),
    ("doc", "application/msword"),
    ("xls", "application/vnd.ms-excel"),
    ("ppt", "application/vnd.powerpoint"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("zip", "application/zip"),
    ("gz", "application/x-gzip"),
    ("tar", "application/x-tar"),
    ("mp3", "audio/x-mpeg"),
    ("mpg", "video/mpeg"),
    ("mp4", "video/mp4"),
];

impl ContentTypeGuesser for ExtensionMimetypes {
    fn guess(&self, file_name: &str) -> Option<String> {
        let name = file_name.rsplit(['\\', '/']).next().unwrap_or(file_name);
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, mime)| mime.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_known() {
        let m = ExtensionMimetypes;
        assert_eq!(m.guess("readme.txt").as_deref(), Some("text/plain"));
        assert_eq!(m.guess("REPORT.PDF").as_deref(), Some("application/pdf"));
        assert_eq!(m.guess("\\docs\\a.b\\photo.jpeg").as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_guess_unknown() {
        let m = ExtensionMimetypes;
        assert_eq!(m.guess("Makefile"), None);
        assert_eq!(m.guess("archive.xyz"), None);
        assert_eq!(m.guess("\\dir.txt\\noext"), None);
    }
}
