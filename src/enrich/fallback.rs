// src/enrich/fallback.rs
//! Local heuristics used when generation is unavailable. No AI, no I/O.

pub const FALLBACK_TITLE_CHARS: usize = 80;
pub const FALLBACK_SUMMARY_CHARS: usize = 300;
const FALLBACK_SENTENCES: usize = 2;

/// Cut at a word boundary near `max` chars and add an ellipsis when shortened.
pub fn truncate_words(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(i) if i > head.len() / 2 => &head[..i],
        _ => head.as_str(),
    };
    format!(
        "{}...",
        cut.trim_end_matches(|c: char| c.is_whitespace() || c == ',')
    )
}

/// First `n` sentences. A sentence ends at `.`, `!` or `?` followed by whitespace or end of text.
pub fn first_sentences(text: &str, n: usize) -> String {
    let text = text.trim();
    if text.is_empty() || n == 0 {
        return String::new();
    }
    let mut found = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = match chars.peek() {
                None => true,
                Some((_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                found += 1;
                if found == n {
                    return text[..i + c.len_utf8()].to_string();
                }
            }
        }
    }
    text.to_string()
}

/// A source title worth keeping as-is: long enough and not a bare link.
pub fn title_is_usable(title: &str) -> bool {
    let t = title.trim();
    t.chars().count() > 10 && !t.starts_with("http")
}

/// Display title without AI: original title, else start of body, else URL, else "Untitled".
pub fn fallback_title(title: &str, body: &str, url: Option<&str>) -> String {
    if !title.trim().is_empty() {
        return title.trim().to_string();
    }
    if !body.trim().is_empty() {
        return truncate_words(body, FALLBACK_TITLE_CHARS);
    }
    url.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Untitled".to_string())
}

/// Summary without AI: first one or two sentences of the body, capped; never empty
/// as long as `display_title` is not.
pub fn fallback_summary(body: &str, display_title: &str) -> String {
    let s = first_sentences(body, FALLBACK_SENTENCES);
    if !s.is_empty() {
        return truncate_words(&s, FALLBACK_SUMMARY_CHARS);
    }
    display_title.trim().to_string()
}
