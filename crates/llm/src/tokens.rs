//! Character-based token estimates.
//!
//! Four characters per token is a rough average for English prose and
//! undercounts for code and most non-Latin scripts.

pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate for several prompt parts sent together.
pub fn estimate_total<'a>(parts: impl IntoIterator<Item = &'a str>) -> usize {
    let chars: usize = parts.into_iter().map(|p| p.chars().count()).sum();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Cuts `text` so its estimate fits in `budget` tokens, on a char boundary.
pub fn truncate_to_tokens(text: &str, budget: usize) -> &str {
    let max_chars = budget.saturating_mul(CHARS_PER_TOKEN);
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
