//! Document chunking.

/// Default chunk size in characters.
pub const CHUNK_RUNES: usize = 1000;

/// Split `text` into chunks of at least `max_runes` characters.
///
/// A chunk only ends on a newline (kept at the end of the chunk) once the
/// threshold is reached, so lines are never split. The final chunk holds
/// whatever remains. Concatenating the chunks yields the input. A zero
/// threshold uses [`CHUNK_RUNES`].
pub fn chunk_text(text: &str, max_runes: usize) -> Vec<String> {
    let max_runes = if max_runes == 0 { CHUNK_RUNES } else { max_runes };
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for c in text.chars() {
        current.push(c);
        count += 1;
        if count >= max_runes && c == '\n' {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("one line\nanother", 1000), ["one line\nanother"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("", 10).is_empty());
    }

    #[test]
    fn breaks_only_at_newline_after_threshold() {
        let text = "abc\ndefghij\nkl\nmnop";
        let chunks = chunk_text(text, 5);
        // "abc\n" is under the threshold, so the first break is after "defghij\n".
        assert_eq!(chunks, ["abc\ndefghij\n", "kl\nmnop"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn long_line_is_never_split() {
        let line = "x".repeat(50);
        let chunks = chunk_text(&line, 10);
        assert_eq!(chunks, [line]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // Thai characters are three bytes each in UTF-8.
        let text = "ใบขาว\nกอตะไคร้\n";
        let chunks = chunk_text(text, 5);
        assert_eq!(chunks, ["ใบขาว\n", "กอตะไคร้\n"]);
    }

    #[test]
    fn zero_threshold_uses_default() {
        let text = format!("{}\n{}", "a".repeat(998), "b".repeat(10));
        assert_eq!(chunk_text(&text, 0).len(), 1);
    }
}
