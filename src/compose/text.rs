//! Line breaking against real font metrics

use crate::fonts::FontMetrics;

/// Break `text` into lines no wider than `max_width` points at `size`.
///
/// Explicit newlines always break. Words are packed greedily; a word wider
/// than the whole line is split between characters.
pub fn split_text_to_size<F: FontMetrics + ?Sized>(
    font: &F,
    text: &str,
    size: f32,
    max_width: f32,
) -> Vec<String> {
    let fits = |candidate: &str| font.width_of_text_at_size(candidate, size) <= max_width;
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() {
                let candidate = format!("{} {}", current, word);
                if fits(&candidate) {
                    current = candidate;
                    continue;
                }
                lines.push(std::mem::take(&mut current));
            }
            if fits(word) {
                current = word.to_string();
                continue;
            }
            // Hard-break an overlong word; its tail may still share a line
            for c in word.chars() {
                let mut candidate = current.clone();
                candidate.push(c);
                if !current.is_empty() && !fits(&candidate) {
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                } else {
                    current = candidate;
                }
            }
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{FontStyle, StandardFont};

    fn helvetica() -> StandardFont {
        StandardFont::helvetica(FontStyle::Normal)
    }

    #[test]
    fn test_short_text_stays_on_one_line() {
        let lines = split_text_to_size(&helvetica(), "Sehr geehrte Damen", 11.0, 500.0);
        assert_eq!(lines, vec!["Sehr geehrte Damen"]);
    }

    #[test]
    fn test_wraps_on_word_boundaries() {
        let font = helvetica();
        let text = "Hiermit bewerbe ich mich auf die ausgeschriebene Stelle als Entwicklerin";
        let lines = split_text_to_size(&font, text, 11.0, 150.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(font.width_of_text_at_size(line, 11.0) <= 150.0);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_overlong_word_is_split() {
        let font = helvetica();
        let word = "Donaudampfschifffahrtsgesellschaftskapitän";
        let lines = split_text_to_size(&font, word, 12.0, 80.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
        for line in &lines {
            assert!(font.width_of_text_at_size(line, 12.0) <= 80.0);
        }
    }

    #[test]
    fn test_newlines_are_kept() {
        let lines = split_text_to_size(&helvetica(), "Zeile eins\n\nZeile drei", 11.0, 500.0);
        assert_eq!(lines, vec!["Zeile eins", "", "Zeile drei"]);
    }
}
