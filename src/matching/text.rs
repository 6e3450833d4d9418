//! Name normalization.

const HONORIFICS: &[&str] = &["mr", "mrs", "ms", "miss", "dr", "prof", "sir"];
const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];

/// Lowercase, drop leading honorifics and trailing generational suffixes,
/// collapse whitespace: `"Dr. John  Watson Jr."` → `"john watson"`.
///
/// A name consisting only of an honorific is returned lowercased rather
/// than emptied.
pub fn normalize_name(name: &str) -> String {
    let tokens: Vec<String> = name
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    let bare = |t: &str| t.trim_end_matches('.').to_string();

    let mut start = 0;
    while start < tokens.len() && HONORIFICS.contains(&bare(&tokens[start]).as_str()) {
        start += 1;
    }
    let mut end = tokens.len();
    while end > start && SUFFIXES.contains(&bare(&tokens[end - 1]).as_str()) {
        end -= 1;
    }

    if start >= end {
        return tokens.join(" ");
    }
    tokens[start..end].join(" ")
}
