use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use super::filters::strip_query_and_fragment;
use crate::models::AssetPath;

/// Characters escaped when a file name is written back into markup or CSS.
///
/// Quotes, parentheses and commas would otherwise terminate an attribute value, a
/// `url(...)` argument or a `srcset` entry.
const FILE_NAME_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b',')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'#')
    .add(b'?');

/// Reasons a locator cannot be mapped to a path inside the asset tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    /// Nothing remains once the query string is removed.
    #[error("locator has no path component")]
    Empty,
    /// `..` segments climb above the asset root.
    #[error("locator escapes the asset root")]
    OutsideRoot,
}

/// Produce the canonical asset path for a locator found in a file living in `base_dir`.
///
/// Query strings and fragments are dropped, percent escapes decoded and `.`/`..`
/// segments resolved. Root-relative locators (`/x`) start at the asset root instead of
/// `base_dir`. The result always uses forward slashes, regardless of the separator the
/// locator was written with.
pub fn normalize_locator(locator: &str, base_dir: &str) -> Result<AssetPath, LocatorError> {
    let raw = strip_query_and_fragment(locator.trim());
    let decoded = percent_decode_str(raw)
        .decode_utf8_lossy()
        .replace('\\', "/");

    let (start, relative) = match decoded.strip_prefix('/') {
        Some(rest) => ("", rest),
        None => (base_dir, decoded.as_str()),
    };

    let mut segments: Vec<&str> = start
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(LocatorError::OutsideRoot);
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() || decoded.ends_with('/') {
        return Err(LocatorError::Empty);
    }

    Ok(AssetPath::new(segments.join("/")))
}

/// Replace the file name of `locator`, keeping its directory prefix and query string.
///
/// Used when a reference is re-pointed to a sibling asset so that the surrounding text
/// keeps its original style (`./`, `../`, `?ver=` suffixes and so on).
pub fn repoint_locator(locator: &str, new_file_name: &str) -> String {
    let path_end = locator.find(['?', '#']).unwrap_or(locator.len());
    let (path, suffix) = locator.split_at(path_end);
    let dir_end = path.rfind(['/', '\\']).map(|index| index + 1).unwrap_or(0);
    let encoded: String = utf8_percent_encode(new_file_name, FILE_NAME_ESCAPES).collect();
    format!("{}{}{}", &path[..dir_end], encoded, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_document_relative_locators() {
        let path = normalize_locator("./assets/media/2024/10/photo.png?ver=2", "").unwrap();
        assert_eq!(path.as_str(), "assets/media/2024/10/photo.png");
    }

    #[test]
    fn resolves_parent_segments_against_the_referencing_file() {
        let path = normalize_locator("../../fonts/a.woff2#iefix", "assets/css/vendor").unwrap();
        assert_eq!(path.as_str(), "assets/fonts/a.woff2");
    }

    #[test]
    fn root_relative_locators_ignore_base_dir() {
        let path = normalize_locator("/assets/logo.png", "assets/css").unwrap();
        assert_eq!(path.as_str(), "assets/logo.png");
    }

    #[test]
    fn decodes_percent_escapes() {
        let path = normalize_locator("./media/my%20photo.jpg", "").unwrap();
        assert_eq!(path.as_str(), "media/my photo.jpg");
    }

    #[test]
    fn normalises_backslashes_from_windows_inputs() {
        let path = normalize_locator(".\\media\\a.png", "").unwrap();
        assert_eq!(path.as_str(), "media/a.png");
    }

    #[test]
    fn rejects_paths_above_the_root() {
        assert_eq!(
            normalize_locator("../../other/assets/photo.jpg", "assets"),
            Err(LocatorError::OutsideRoot)
        );
    }

    #[test]
    fn rejects_directory_only_locators() {
        assert_eq!(normalize_locator("./wp-content/uploads/", ""), Err(LocatorError::Empty));
        assert_eq!(normalize_locator("?ver=1", ""), Err(LocatorError::Empty));
    }

    #[test]
    fn repoints_file_name_and_keeps_prefix_and_query() {
        assert_eq!(
            repoint_locator("./media/2024/10/photo-300x74.png?ver=3", "photo.png"),
            "./media/2024/10/photo.png?ver=3"
        );
        assert_eq!(repoint_locator("logo.png", "logo-300x75.png"), "logo-300x75.png");
    }

    #[test]
    fn repoints_backslashed_locators_inside_their_directory() {
        let locator = "./media\\2024\\p-300x74.png";
        assert_eq!(
            normalize_locator(locator, "").unwrap().as_str(),
            "media/2024/p-300x74.png"
        );
        let repointed = repoint_locator(locator, "p.png");
        assert_eq!(repointed, "./media\\2024\\p.png");
        assert_eq!(normalize_locator(&repointed, "").unwrap().as_str(), "media/2024/p.png");
    }

    #[test]
    fn escapes_characters_that_would_break_quoting() {
        assert_eq!(
            repoint_locator("./media/a.png", "it's (new), \"final\".png"),
            "./media/it%27s%20%28new%29%2C%20%22final%22.png"
        );
    }
}
