//! Name sanitization
//!
//! Filesystems allow names that are not valid UTF-8 or that contain control
//! characters. Those break text columns in the database, so every name is
//! normalized before it is stored:
//!
//! 1. decode permissively (invalid sequences become U+FFFD)
//! 2. replace every character outside the allow-list with `?`
//! 3. bound the encoded length to the column width, keeping the tail
//!
//! The placeholder and U+FFFD are both outside every allow-list, so running
//! the sanitizer over its own output changes nothing.

use regex::Regex;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::sync::LazyLock;

/// Maximum stored directory name width in bytes
pub const MAX_DIR_NAME_LEN: usize = 255;

/// Maximum stored file name width in bytes
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Character substituted for anything outside the allow-list
pub const PLACEHOLDER: &str = "?";

/// Directory names may carry `/` because a traversal root is stored by its full path
static DIR_NAME_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s./-]").expect("Invalid directory name regex"));

static FILE_NAME_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.-]").expect("Invalid file name regex"));

/// Sanitize a raw directory name (or a traversal root path)
pub fn sanitize_dir_name(raw: &[u8]) -> String {
    sanitize(raw, &DIR_NAME_DISALLOWED, MAX_DIR_NAME_LEN)
}

/// Sanitize a raw file name
pub fn sanitize_file_name(raw: &[u8]) -> String {
    sanitize(raw, &FILE_NAME_DISALLOWED, MAX_FILE_NAME_LEN)
}

fn sanitize(raw: &[u8], disallowed: &Regex, max_len: usize) -> String {
    let decoded = String::from_utf8_lossy(raw);
    let replaced = disallowed.replace_all(&decoded, PLACEHOLDER);
    keep_tail(&replaced, max_len).to_string()
}

/// Longest suffix of `s` that fits in `max_len` bytes and starts on a char boundary
fn keep_tail(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut start = s.len() - max_len;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Longest prefix of `s` that fits in `max_len` bytes and ends on a char boundary
///
/// Used for free-text job metadata, where the beginning is what matters.
pub fn truncate_to_width(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Raw bytes of an OS name, as the filesystem reported them
#[cfg(unix)]
pub fn name_bytes(name: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(name.as_bytes())
}

/// Raw bytes of an OS name, as the filesystem reported them
#[cfg(not(unix))]
pub fn name_bytes(name: &OsStr) -> Cow<'_, [u8]> {
    match name.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_names_unchanged() {
        assert_eq!(sanitize_file_name(b"track 01 - intro.mp3"), "track 01 - intro.mp3");
        assert_eq!(sanitize_dir_name(b"/srv/music/Album_2017"), "/srv/music/Album_2017");
        assert_eq!(sanitize_file_name("Café déjà vu.flac".as_bytes()), "Café déjà vu.flac");
    }

    #[test]
    fn test_disallowed_characters_replaced() {
        assert_eq!(sanitize_file_name(b"a*b?c:d.txt"), "a?b?c?d.txt");
        // File names never carry a separator, directory roots do
        assert_eq!(sanitize_file_name(b"x/y"), "x?y");
        assert_eq!(sanitize_dir_name(b"x/y"), "x/y");
        assert_eq!(sanitize_file_name(b"nul\0byte"), "nul?byte");
    }

    #[test]
    fn test_invalid_utf8_substituted() {
        let raw = b"bad\xff\xfename.txt";
        let name = sanitize_file_name(raw);
        assert_eq!(name, "bad??name.txt");
    }

    #[test]
    fn test_long_name_keeps_tail() {
        let mut raw = "x".repeat(300);
        raw.push_str(".mp3");
        let name = sanitize_file_name(raw.as_bytes());
        assert_eq!(name.len(), MAX_FILE_NAME_LEN);
        assert!(name.ends_with(".mp3"));
    }

    #[test]
    fn test_multibyte_truncation_stays_within_width() {
        // 'é' is two bytes; 200 of them is 400 bytes
        let raw = "é".repeat(200);
        let name = sanitize_file_name(raw.as_bytes());
        assert!(name.len() <= MAX_FILE_NAME_LEN);
        assert!(name.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("short", 20), "short");
        assert_eq!(truncate_to_width("abcdef", 3), "abc");
        assert_eq!(truncate_to_width("aé", 2), "a");
    }

    proptest! {
        #[test]
        fn prop_file_sanitize_idempotent(raw in proptest::collection::vec(any::<u8>(), 0..600)) {
            let once = sanitize_file_name(&raw);
            let twice = sanitize_file_name(once.as_bytes());
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.len() <= MAX_FILE_NAME_LEN);
        }

        #[test]
        fn prop_dir_sanitize_idempotent(raw in "\\PC{0,300}") {
            let once = sanitize_dir_name(raw.as_bytes());
            let twice = sanitize_dir_name(once.as_bytes());
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.len() <= MAX_DIR_NAME_LEN);
        }
    }
}
