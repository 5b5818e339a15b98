use std::sync::LazyLock;

use regex::Regex;

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[].*?[\)\]]").unwrap());
static VEVO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)vevo").unwrap());

/// Drop bracketed or parenthesised annotations such as "(Official Video)".
/// A title that mentioned "remix" keeps a trailing " Remix" so the search
/// still targets the remix.
pub fn clean_track_title(title: &str) -> String {
    let mut cleaned = ANNOTATION.replace_all(title, "").trim().to_string();

    if title.to_lowercase().contains("remix") && !cleaned.to_lowercase().contains("remix") {
        cleaned.push_str(" Remix");
    }

    cleaned
}

/// Strip the "VEVO" channel marker from a YouTube artist name.
pub fn clean_artist_name(name: &str) -> String {
    VEVO.replace_all(name, "").trim().to_string()
}

/// "A", "A and B", "A, B and C".
pub fn natural_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}
