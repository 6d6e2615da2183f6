use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Absolute-path-looking substrings, at least two segments deep.
static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:/[\w._-]+){2,}").expect("path regex"));

/// Redact the current user's home directory out of a path, keeping the
/// filename so the caller can still see what failed.
fn redact_home(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    let Some(home) = dirs::home_dir() else {
        return path_str.to_string();
    };
    let home_str = home.to_string_lossy();
    if !path_str.starts_with(home_str.as_ref()) {
        return path_str.to_string();
    }
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("~/<redacted>/{filename}")
}

/// Scrub a CLI stderr tail (or any diagnostic text) of absolute paths under
/// the invoking user's home directory before it is surfaced in a
/// `ValidationResult` or returned to a caller. System paths (`/usr`, `/etc`,
/// ...) and paths outside `$HOME` pass through unchanged.
pub fn sanitize_error_message(msg: &str) -> String {
    let Some(home) = dirs::home_dir() else {
        return msg.to_string();
    };
    let home_str = home.to_string_lossy();

    PATH_RE
        .replace_all(msg, |caps: &regex::Captures| {
            let matched = &caps[0];
            if matched.starts_with(home_str.as_ref()) {
                redact_home(Path::new(matched))
            } else {
                matched.to_string()
            }
        })
        .to_string()
}
