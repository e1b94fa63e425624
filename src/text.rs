use std::collections::HashSet;

/// Lowercases, drops `?`, `.` and `!`, then trims. Other punctuation is kept.
///
/// Trimming happens last so that `"hello ?"` and `"hello"` normalize alike.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '?' | '.' | '!'))
        .collect();
    stripped.trim().to_string()
}

/// Jaccard similarity over whitespace-separated token sets.
pub fn similarity(text1: &str, text2: &str) -> f64 {
    let set1: HashSet<_> = text1.split_whitespace().collect();
    let set2: HashSet<_> = text2.split_whitespace().collect();
    let intersection = set1.intersection(&set2).count();
    let union = set1.union(&set2).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// True when any of `needles` occurs as a substring of `haystack`.
pub fn contains_any<'a, I>(haystack: &str, needles: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    needles.into_iter().any(|n| haystack.contains(n.as_str()))
}
