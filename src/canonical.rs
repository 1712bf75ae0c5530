//! Canonical movie filenames: `Title (Year)[ [3D]].ext`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::split_extension;

// Only `/` and NUL are invalid on ext filesystems, but the library is also shared over SMB. NUL is
// assumed never to appear in a title.
static ILLEGAL_FS_CHARS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>"\\/|?*\x01-\x1f]"#).unwrap());

const THREE_D_MARKER: &str = "[3D";

pub fn is_3d(filename: &str) -> bool {
    filename.contains(THREE_D_MARKER)
}

/// Replace characters that are unsafe in a single path segment: `:` becomes `-`, the rest `_`.
pub fn sanitize_filename(name: &str) -> String {
    let name = name.replace(':', "-");
    ILLEGAL_FS_CHARS_REGEX.replace_all(&name, "_").into_owned()
}

/// Compute the canonical filename of a movie from its title, its release year and the filename it
/// currently has. A missing year still produces `()`.
pub fn canonical_filename(title: &str, year: Option<&str>, original_filename: &str) -> String {
    let mut name = sanitize_filename(&format!("{} ({})", title, year.unwrap_or_default()));
    if is_3d(original_filename) {
        name.push_str(" [3D]");
    }
    let (_, extension) = split_extension(original_filename);
    name.push_str(extension);
    name
}
