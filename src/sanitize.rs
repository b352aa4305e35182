use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Name used when a URL has no usable final segment.
const FALLBACK_NAME: &str = "file";

/// Stem length used when the extension and hash leave no room for one.
const FALLBACK_STEM_LEN: usize = 8;

const HASH_LEN: usize = 8;

/// Default bound for the name component of a composed path.
pub const MAX_NAME_LEN: usize = 100;

/// Bound for the name component when the whole path is too long.
pub const SHORT_NAME_LEN: usize = 50;

/// Ceiling on the length of a composed path.
pub const MAX_PATH_LEN: usize = 500;

/// Extract a clean file name from a URL or a plain name.
///
/// Drops the query string and fragment, keeps the final path segment and
/// percent-decodes it. Empty results and bare separators become `"file"`.
pub fn extract_clean_filename(raw: &str) -> String {
    let without_query = raw.split('?').next().unwrap_or_default();
    let without_fragment = without_query.split('#').next().unwrap_or_default();
    let segment = without_fragment.rsplit('/').next().unwrap_or_default();

    let decoded = percent_decode(segment);
    if matches!(&*decoded, "" | "/" | "." | "..") {
        return FALLBACK_NAME.to_string();
    }

    // An encoded separator must not turn the name into a nested path
    decoded.replace(['/', '\0'], "_")
}

fn percent_decode(segment: &str) -> Cow<'_, str> {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded,
        Err(_) => {
            let bytes = urlencoding::decode_binary(segment.as_bytes());
            Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

/// Truncate `name` to at most `max_len` characters, keeping its extension.
///
/// Names that already fit come back unchanged. Longer names are rebuilt as
/// `stem_HASH.ext`, where `HASH` is the first 8 hex digits of the MD5 of
/// the full original name, so distinct long names never collapse into the
/// same truncated result.
pub fn safe_filename(name: &str, max_len: usize) -> String {
    if char_len(name) <= max_len {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    let hash = short_hash(name);

    let available = max_len
        .checked_sub(char_len(ext) + HASH_LEN + 1)
        .filter(|n| *n > 0)
        .unwrap_or(FALLBACK_STEM_LEN);

    let rebuilt = format!("{}_{}{}", take_chars(stem, available), hash, ext);

    // Only reached when the extension alone is longer than the bound
    if char_len(&rebuilt) > max_len {
        return take_chars(&rebuilt, max_len).to_string();
    }
    rebuilt
}

/// Join `dir` with a sanitized name bounded to [`MAX_NAME_LEN`] characters.
pub fn safe_filepath(dir: &Path, name: &str) -> PathBuf {
    safe_filepath_bounded(dir, name, MAX_NAME_LEN)
}

/// Join `dir` with a sanitized name bounded to `max_name_len` characters.
///
/// If the composed path is longer than [`MAX_PATH_LEN`], the name is
/// re-derived with the tighter [`SHORT_NAME_LEN`] bound.
pub fn safe_filepath_bounded(dir: &Path, name: &str, max_name_len: usize) -> PathBuf {
    let clean = extract_clean_filename(name);
    let path = dir.join(safe_filename(&clean, max_name_len));

    if char_len(&path.to_string_lossy()) > MAX_PATH_LEN {
        return dir.join(safe_filename(&clean, SHORT_NAME_LEN));
    }
    path
}

/// Split a name into stem and extension; leading dots are part of the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|c| c != '.') => name.split_at(dot),
        _ => (name, ""),
    }
}

fn short_hash(name: &str) -> String {
    let digest = format!("{:x}", md5::compute(name.as_bytes()));
    digest[..HASH_LEN].to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
