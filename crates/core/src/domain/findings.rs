use regex::Regex;

const BULLETS: [char; 3] = ['•', '-', '*'];

/// Pulls bullet lines out of generated text, bullet marker stripped.
pub fn extract_key_findings(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let rest = line.strip_prefix(BULLETS)?;
            let rest = rest.trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
        .collect()
}

/// Strips control characters that break storage, keeping line structure.
pub fn sanitize_content(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// First integer in a verification reply, read as a 0-100 score.
pub fn parse_verification_score(reply: &str) -> Option<u8> {
    let re = Regex::new(r"\b(\d{1,3})\b").ok()?;
    let caps = re.captures(reply)?;
    let score: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(score.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mixed_bullets() {
        let text = "Intro\n• First\n  - Second  \n* Third\n•   \nplain";
        assert_eq!(extract_key_findings(text), vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_extract_empty() {
        assert!(extract_key_findings("no bullets here").is_empty());
    }

    #[test]
    fn test_sanitize_content() {
        let text = "a\u{0000}b\u{0007}c\nd\te";
        assert_eq!(sanitize_content(text), "abc\nd\te");
    }

    #[test]
    fn test_parse_verification_score() {
        assert_eq!(parse_verification_score("Verification score: 85/100"), Some(85));
        assert_eq!(parse_verification_score("Score 250"), Some(100));
        assert_eq!(parse_verification_score("no score"), None);
    }
}
