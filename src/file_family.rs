//! File family table used to judge whether a file's extension matches its content.
//!
//! A family is the broad kind of payload (image, audio, archive, ...). The
//! probe maps a detected MIME type to a family, and the stored extension is
//! mapped through the same table, so the weird-extension rule can compare the
//! two without caring about exact formats (a PNG named `.jpg` is still an image).
//!
//! # Examples
//!
//! ```
//! use reshelf::file_family::{Family, FileMapper};
//!
//! let mapper = FileMapper::default();
//! assert_eq!(mapper.mime_to_family("image/png"), Some(Family::Image));
//! assert_eq!(mapper.extension_to_family("MKV"), Some(Family::Video));
//! assert_eq!(mapper.extension_to_family("@@@"), None);
//! ```

use std::collections::{HashMap, HashSet};

/// Broad payload family of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Image,
    Audio,
    Video,
    Document,
    Archive,
    Code,
    Spreadsheet,
    Presentation,
    Font,
}

/// Result of comparing a stored extension against a detected signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionVerdict {
    /// The extension fits the detected content.
    Consistent,
    /// The extension is missing, unknown, or names another family.
    Mismatch,
    /// The content signature does not map to a known family.
    Inconclusive,
}

/// Maps MIME types and file extensions to families.
#[derive(Debug, Clone)]
pub struct FileMapper {
    mime_map: HashMap<String, Family>,
    extension_map: HashMap<String, Family>,
    // (detected mime, extension) pairs where the extension legitimately
    // names a format layered on the detected container.
    wrappers: HashSet<(String, String)>,
}

impl FileMapper {
    /// Creates a new `FileMapper` with all standard mappings.
    pub fn new() -> Self {
        let mut mapper = Self {
            mime_map: HashMap::new(),
            extension_map: HashMap::new(),
            wrappers: HashSet::new(),
        };
        mapper.populate_standard_mappings();
        mapper
    }

    fn populate_standard_mappings(&mut self) {
        for mime in [
            "image/png",
            "image/jpeg",
            "image/gif",
            "image/webp",
            "image/bmp",
            "image/tiff",
            "image/heif",
            "image/avif",
            "image/jp2",
            "image/jxl",
            "image/vnd.microsoft.icon",
            "image/vnd.adobe.photoshop",
            "image/x-canon-cr2",
        ] {
            self.add_mime_mapping(mime, Family::Image);
        }

        for mime in [
            "audio/mpeg",
            "audio/m4a",
            "audio/ogg",
            "audio/x-flac",
            "audio/x-wav",
            "audio/aac",
            "audio/amr",
            "audio/midi",
            "audio/x-aiff",
            "audio/x-ape",
        ] {
            self.add_mime_mapping(mime, Family::Audio);
        }

        for mime in [
            "video/mp4",
            "video/x-m4v",
            "video/quicktime",
            "video/x-matroska",
            "video/webm",
            "video/x-msvideo",
            "video/x-ms-wmv",
            "video/mpeg",
            "video/x-flv",
        ] {
            self.add_mime_mapping(mime, Family::Video);
        }

        for mime in [
            "application/pdf",
            "application/rtf",
            "application/epub+zip",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.oasis.opendocument.text",
        ] {
            self.add_mime_mapping(mime, Family::Document);
        }

        for mime in [
            "application/zip",
            "application/vnd.rar",
            "application/x-7z-compressed",
            "application/x-tar",
            "application/gzip",
            "application/x-bzip2",
            "application/x-xz",
            "application/zstd",
            "application/x-lz4",
            "application/vnd.ms-cab-compressed",
        ] {
            self.add_mime_mapping(mime, Family::Archive);
        }

        for mime in [
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.oasis.opendocument.spreadsheet",
        ] {
            self.add_mime_mapping(mime, Family::Spreadsheet);
        }

        for mime in [
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.oasis.opendocument.presentation",
        ] {
            self.add_mime_mapping(mime, Family::Presentation);
        }

        for mime in [
            "application/font-woff",
            "application/font-sfnt",
            "font/ttf",
            "font/otf",
            "font/woff",
            "font/woff2",
        ] {
            self.add_mime_mapping(mime, Family::Font);
        }

        // Extension mappings (case-insensitive)
        for ext in [
            "png", "jpg", "jpeg", "jpe", "gif", "webp", "svg", "bmp", "tif", "tiff", "ico", "heic",
            "heif", "avif", "jp2", "jxl", "psd", "cr2",
        ] {
            self.add_extension_mapping(ext, Family::Image);
        }

        for ext in [
            "mp3", "wav", "ogg", "oga", "opus", "flac", "aac", "m4a", "m4b", "wma", "amr", "mid",
            "midi", "aif", "aiff", "ape",
        ] {
            self.add_extension_mapping(ext, Family::Audio);
        }

        for ext in [
            "mp4", "m4v", "mkv", "avi", "mov", "qt", "flv", "wmv", "webm", "3gp", "3g2", "mpg",
            "mpeg", "ogv", "f4v",
        ] {
            self.add_extension_mapping(ext, Family::Video);
        }

        for ext in [
            "pdf", "txt", "doc", "docx", "html", "htm", "md", "rtf", "odt", "epub",
        ] {
            self.add_extension_mapping(ext, Family::Document);
        }

        for ext in [
            "zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz", "zst", "lz4", "cab",
        ] {
            self.add_extension_mapping(ext, Family::Archive);
        }

        for ext in [
            "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "bash", "json",
            "xml", "yaml", "yml", "toml",
        ] {
            self.add_extension_mapping(ext, Family::Code);
        }

        for ext in ["csv", "xls", "xlsx", "ods"] {
            self.add_extension_mapping(ext, Family::Spreadsheet);
        }

        for ext in ["ppt", "pptx", "odp"] {
            self.add_extension_mapping(ext, Family::Presentation);
        }

        for ext in ["ttf", "otf", "woff", "woff2"] {
            self.add_extension_mapping(ext, Family::Font);
        }

        // Zip-based formats that a signature check only sees as a zip
        for ext in [
            "docx", "xlsx", "pptx", "odt", "ods", "odp", "epub", "jar", "apk", "aab", "xpi",
            "cbz", "ipa", "whl", "nupkg", "vsix", "kmz", "3mf",
        ] {
            self.add_wrapper("application/zip", ext);
        }
        for ext in ["m4a", "m4b", "m4v", "mov", "3gp", "3g2", "f4v"] {
            self.add_wrapper("video/mp4", ext);
        }
        self.add_wrapper("audio/m4a", "mp4");
        for ext in ["ogv", "opus", "oga", "spx"] {
            self.add_wrapper("audio/ogg", ext);
        }
        self.add_wrapper("video/x-matroska", "mka");
        self.add_wrapper("application/x-tar", "tar");
    }

    /// Adds a MIME type to family mapping.
    pub fn add_mime_mapping(&mut self, mime: &str, family: Family) {
        self.mime_map.insert(mime.to_lowercase(), family);
    }

    /// Adds a file extension to family mapping.
    pub fn add_extension_mapping(&mut self, ext: &str, family: Family) {
        self.extension_map.insert(ext.to_lowercase(), family);
    }

    /// Declares `ext` a legitimate name for content detected as `mime`.
    pub fn add_wrapper(&mut self, mime: &str, ext: &str) {
        self.wrappers.insert((mime.to_lowercase(), ext.to_lowercase()));
    }

    /// Maps a MIME type to a family.
    pub fn mime_to_family(&self, mime_type: &str) -> Option<Family> {
        self.mime_map.get(&mime_type.to_lowercase()).copied()
    }

    /// Maps a file extension to a family.
    pub fn extension_to_family(&self, ext: &str) -> Option<Family> {
        self.extension_map.get(&ext.to_lowercase()).copied()
    }

    /// Compares a stored extension with a detected MIME type.
    ///
    /// # Examples
    ///
    /// ```
    /// use reshelf::file_family::{ExtensionVerdict, FileMapper};
    ///
    /// let mapper = FileMapper::default();
    /// assert_eq!(mapper.verdict("video/mp4", Some("mp4")), ExtensionVerdict::Consistent);
    /// assert_eq!(mapper.verdict("video/mp4", Some("@@@")), ExtensionVerdict::Mismatch);
    /// assert_eq!(mapper.verdict("application/zip", None), ExtensionVerdict::Mismatch);
    /// assert_eq!(mapper.verdict("application/zip", Some("docx")), ExtensionVerdict::Consistent);
    /// assert_eq!(mapper.verdict("image/tiff", Some("nef")), ExtensionVerdict::Inconclusive);
    /// assert_eq!(
    ///     mapper.verdict("application/x-executable", Some("bin")),
    ///     ExtensionVerdict::Inconclusive
    /// );
    /// ```
    pub fn verdict(&self, detected_mime: &str, ext: Option<&str>) -> ExtensionVerdict {
        let Some(detected) = self.mime_to_family(detected_mime) else {
            return ExtensionVerdict::Inconclusive;
        };
        let Some(ext) = ext.filter(|e| !e.is_empty()) else {
            return ExtensionVerdict::Mismatch;
        };

        if self
            .wrappers
            .contains(&(detected_mime.to_lowercase(), ext.to_lowercase()))
        {
            return ExtensionVerdict::Consistent;
        }

        match self.extension_to_family(ext) {
            Some(family) if family == detected => ExtensionVerdict::Consistent,
            Some(_) => ExtensionVerdict::Mismatch,
            None if is_junk_extension(ext) => ExtensionVerdict::Mismatch,
            None => ExtensionVerdict::Inconclusive,
        }
    }
}

/// An extension no real format would use, such as `@@@` or `mpeg@@@`.
fn is_junk_extension(ext: &str) -> bool {
    !ext.chars().all(|c| c.is_ascii_alphanumeric())
}

impl Default for FileMapper {
    fn default() -> Self {
        Self::new()
    }
}
