//! Binary/text classification.
//!
//! Text stages must never rewrite binary data. A file is binary when its
//! extension is on the known-binary list, or when a sniff of its first
//! [`SNIFF_LEN`] bytes finds a NUL byte or a high share of control bytes in
//! content that is not valid UTF-8.

use std::path::Path;

/// Number of leading bytes inspected by the content sniff.
pub const SNIFF_LEN: usize = 512;

/// Extensions that are always treated as binary, lowercase, without the dot.
const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "aac", "avif", "bin", "bmp", "bz2", "class", "dll", "dmg", "doc", "docx", "eot",
    "exe", "flac", "gif", "gz", "ico", "icns", "jar", "jpeg", "jpg", "m4a", "mov", "mp3",
    "mp4", "o", "otf", "pdf", "png", "psd", "rar", "so", "swf", "tar", "tgz", "tif", "tiff",
    "ttf", "wasm", "wav", "webm", "webp", "woff", "woff2", "xls", "xlsx", "xz", "zip",
];

/// Classify a file by name and (optional) contents.
///
/// `contents` is `None` for directories; those are classified by name only.
pub fn is_binary(path: &Path, contents: Option<&[u8]>) -> bool {
    if has_binary_extension(path) {
        return true;
    }
    contents.is_some_and(sniff)
}

fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            BINARY_EXTENSIONS
                .iter()
                .any(|known| e.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Content sniff over the leading bytes.
fn sniff(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => false,
        // A multi-byte sequence cut off by the sample boundary is still text.
        Err(e) if e.error_len().is_none() => false,
        Err(_) => {
            let suspicious = sample
                .iter()
                .filter(|&&b| b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0c | 0x1b))
                .count();
            suspicious * 10 > sample.len()
        }
    }
}
