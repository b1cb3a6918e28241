//! Display formatting for user and model text
//!
//! Text is HTML-escaped first and then wrapped, so the page never interprets
//! submitted markup and long translations stay readable.

use unicode_segmentation::UnicodeSegmentation;

/// Line width used by the page
pub const DEFAULT_WRAP_WIDTH: usize = 100;

/// Escape the five HTML-significant characters
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Greedy word wrap
///
/// Runs of whitespace (newlines included) collapse into word boundaries.
/// Words wider than `width` are split into `width`-sized chunks. Width is
/// counted in grapheme clusters so combining marks in Devanagari and Bengali
/// script do not count as extra columns. Blank input gives no lines.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let graphemes: Vec<&str> = word.graphemes(true).collect();

        if graphemes.len() > width {
            // Fill the rest of the current line first
            let mut rest = &graphemes[..];
            if current_width > 0 && current_width + 1 < width {
                let room = width - current_width - 1;
                current.push(' ');
                current.push_str(&rest[..room].concat());
                rest = &rest[room..];
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current_width = 0;

            let mut chunks = rest.chunks(width).peekable();
            while let Some(chunk) = chunks.next() {
                if chunks.peek().is_some() {
                    lines.push(chunk.concat());
                } else {
                    current = chunk.concat();
                    current_width = chunk.len();
                }
            }
            continue;
        }

        let needed = if current_width == 0 {
            graphemes.len()
        } else {
            current_width + 1 + graphemes.len()
        };

        if needed > width {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = graphemes.len();
        } else {
            if current_width > 0 {
                current.push(' ');
            }
            current.push_str(word);
            current_width = needed;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Escape `text`, wrap it at `width` and join the lines with `<br>`
pub fn escape_and_wrap(text: &str, width: usize) -> String {
    wrap(&escape_html(text), width).join("<br>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
        assert_eq!(escape_html("नमस्ते"), "नमस्ते");
    }

    #[test]
    fn test_short_text_single_line() {
        assert_eq!(escape_and_wrap("Hello world", DEFAULT_WRAP_WIDTH), "Hello world");
    }

    #[test]
    fn test_script_tag_is_inert() {
        let out = escape_and_wrap("<script>alert(1)</script>", DEFAULT_WRAP_WIDTH);
        assert!(!out.contains('<'));
        assert_eq!(out, "&lt;script&gt;alert(1)&lt;/script&gt;");
    }

    #[test]
    fn test_wrap_at_word_boundaries() {
        let text = "word ".repeat(50);
        let lines = wrap(&text, 100);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.chars().count() <= 100));
        assert_eq!(lines.join(" "), text.trim_end());
    }

    #[test]
    fn test_250_chars_without_spaces() {
        let text = "a".repeat(250);
        let lines = wrap(&text, 100);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 100);
        assert_eq!(lines[1].len(), 100);
        assert_eq!(lines[2].len(), 50);

        let joined = escape_and_wrap(&text, 100);
        assert_eq!(joined.matches("<br>").count(), 2);
    }

    #[test]
    fn test_long_word_fills_current_line() {
        let lines = wrap("ab cdefghij", 5);
        assert_eq!(lines, vec!["ab cd", "efghi", "j"]);
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(wrap("a \n\n  b\tc", 100), vec!["a b c"]);
        assert!(wrap("   \n\t", 100).is_empty());
        assert_eq!(escape_and_wrap("", 100), "");
    }

    #[test]
    fn test_width_counts_graphemes() {
        // "नमस्ते" is 6 code points but at most 4 grapheme clusters
        let word = "नमस्ते";
        assert!(word.graphemes(true).count() <= 4);
        let lines = wrap(&format!("{} {}", word, word), 9);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_rewrap_is_stable_and_short_words_stay_whole() {
        let escaped = escape_html("Tom & Jerry <b>bold</b> \"quoted\" it's");
        let samples: [&str; 5] = [
            "The quick brown fox jumps over the lazy dog",
            "मेरा नाम राहुल है और मैं दिल्ली में रहता हूँ",
            "আমি বাংলায় গান গাই supercalifragilistic",
            &escaped,
            "a bb ccc dddd eeeee ffffff ggggggg hhhhhhhhhhhhhhhhhh",
        ];

        for sample in samples {
            for width in 1..=12 {
                let lines = wrap(sample, width);

                let rewrapped = wrap(&lines.join(" "), width);
                assert_eq!(rewrapped, lines, "rewrap of {:?} at width {}", sample, width);

                for word in sample.split_whitespace() {
                    if word.graphemes(true).count() > width {
                        continue;
                    }
                    assert!(
                        lines
                            .iter()
                            .any(|line| line.split_whitespace().any(|token| token == word)),
                        "{:?} was split at width {}",
                        word,
                        width
                    );
                }
            }
        }
    }
}
