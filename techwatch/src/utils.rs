/// Text processing utilities
pub mod text {
    use scraper::{ElementRef, Html, Node};

    /// Prefixes models like to put in front of a summary
    const SUMMARY_PREFIXES: [&str; 5] = [
        "Voici un résumé :",
        "Résumé :",
        "L'article explique que",
        "Here is a summary:",
        "Summary:",
    ];

    /// Elements whose text is never shown to a reader
    const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

    /// Plain text of an HTML fragment, leaving out script and style content
    pub fn strip_html(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        visible_text(fragment.root_element())
    }

    /// Visible text under `element`, whitespace collapsed
    pub fn visible_text(element: ElementRef<'_>) -> String {
        let mut parts: Vec<&str> = Vec::new();

        for node in element.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
            });
            if !hidden {
                parts.push(text);
            }
        }

        collapse_whitespace(&parts.join(" "))
    }

    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Truncate text to at most `max_chars` characters, trying to break at a sentence boundary
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let truncated: String = text.chars().take(max_chars).collect();
        if let Some(last_sentence) = truncated.rfind(". ").or_else(|| truncated.rfind('.')) {
            truncated[..last_sentence + 1].to_string()
        } else if let Some(last_space) = truncated.rfind(' ') {
            format!("{}...", &truncated[..last_space])
        } else {
            format!("{}...", truncated)
        }
    }

    /// Strip boilerplate lead-ins from a generated summary
    pub fn clean_summary(summary: &str) -> String {
        let mut cleaned = summary.trim();
        loop {
            let before = cleaned;
            for prefix in SUMMARY_PREFIXES {
                if let Some(rest) = cleaned.strip_prefix(prefix) {
                    cleaned = rest.trim_start();
                }
            }
            if cleaned == before {
                break;
            }
        }
        cleaned.to_string()
    }
}

/// Hashing helpers
pub mod hash {
    use sha2::{Digest, Sha256};

    /// Hex SHA-256 of the newline-joined `parts`
    pub fn sha256_lines(parts: &[String]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(parts.join("\n").as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}
