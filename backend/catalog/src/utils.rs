use std::sync::LazyLock;

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use streamgate::show::{NewShow, ShowPatch};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trims and collapses runs of whitespace, case is kept for display.
pub fn normalize_name(input: &str) -> String {
    WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

/// Key two names share when they denote the same show.
pub fn match_key(name: &str) -> String {
    normalize_name(name).to_lowercase()
}

/// Every field of an imported show overwrites the stored one.
pub fn full_patch(show: NewShow) -> ShowPatch {
    ShowPatch {
        name: Some(show.name),
        image: Some(show.image),
        rating: Some(show.rating),
        description: Some(show.description),
        playback_url: Some(show.playback_url),
    }
}

pub fn progress_bar(len: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        assert_eq!(normalize_name("Night Shift"), "Night Shift");
        assert_eq!(normalize_name("Night\tShift"), "Night Shift");
        assert_eq!(normalize_name("Night \n Shift"), "Night Shift");
    }

    #[test]
    fn test_leading_trailing_spaces() {
        assert_eq!(normalize_name("   hello   "), "hello");
        assert_eq!(normalize_name("  multiple   spaces  "), "multiple spaces");
    }

    #[test]
    fn test_punctuation_is_kept() {
        assert_eq!(normalize_name("Mr. Robot: eps1.0"), "Mr. Robot: eps1.0");
    }

    #[test]
    fn test_match_key_ignores_case() {
        assert_eq!(match_key("  NIGHT   shift "), match_key("Night Shift"));
        assert_ne!(match_key("Night Shift"), match_key("Night Shifts"));
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("     "), "");
    }
}
