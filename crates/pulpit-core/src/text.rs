//! Sentence splitting shared by the condenser and the chunker.

/// Full-width and ASCII sentence terminators.
pub fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '.' | '!' | '?')
}

/// Splits after every sentence terminator, keeping the mark with the
/// preceding segment. With `skip_whitespace`, whitespace directly after a
/// terminator is dropped instead of starting the next segment.
///
/// A terminator at the very end never produces a trailing empty segment,
/// but consecutive terminators do produce one-mark segments.
pub fn split_sentences(text: &str, skip_whitespace: bool) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !is_sentence_terminal(c) {
            continue;
        }
        let end = idx + c.len_utf8();
        segments.push(&text[start..end]);
        start = end;
        if skip_whitespace {
            while let Some(&(ws_idx, ws)) = chars.peek() {
                if !ws.is_whitespace() {
                    break;
                }
                start = ws_idx + ws.len_utf8();
                chars.next();
            }
        }
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }
    segments
}
