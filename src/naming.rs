// Name normalization for catalog entries
// Sort names double as on-disk path segments, so they must survive exFAT.

use std::sync::LazyLock;
use regex::Regex;

// Characters exFAT rejects, plus a few that confuse shells
static UNSAFE_CHARACTERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>:"/\\|?*$!%`~]"#).expect("unsafe character pattern is valid")
});

/// Derive the sort name (and path segment) from a display name
pub fn sort_name(display: &str) -> String {
    let lowered = display.to_lowercase();
    UNSAFE_CHARACTERS.replace_all(&lowered, "").trim().to_string()
}

/// Sort name used for published files: a leading "the " is dropped
pub fn output_sort_name(display: &str) -> String {
    let sort = sort_name(display);
    match sort.strip_prefix("the ") {
        Some(rest) if !rest.trim().is_empty() => rest.trim_start().to_string(),
        _ => sort,
    }
}

/// True if `name` can be used as-is as a directory or file stem.
/// Case is preserved, unlike `sort_name`.
pub fn name_valid_for_disk(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.trim() != name {
        return false;
    }
    !UNSAFE_CHARACTERS.is_match(name)
}
