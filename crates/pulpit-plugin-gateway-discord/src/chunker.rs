use pulpit_core::split_sentences;

const CONTINUATION: &str = "...";

/// Splits `text` into pieces of at most `max_len` characters, breaking on
/// sentence boundaries where possible. A sentence that cannot fit on its
/// own is cut into `max_len - 3` character pieces, each marked with `...`.
/// Limits too small to hold the marker get bare `max_len` pieces instead.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let marker = if max_len > CONTINUATION.len() { CONTINUATION } else { "" };
    let hard_len = (max_len - marker.len()).max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text, true) {
        let sentence_len = sentence.chars().count();
        if current_len + sentence_len <= max_len {
            current.push_str(sentence);
            current_len += sentence_len;
            continue;
        }

        if !current.is_empty() {
            push_trimmed(&mut chunks, &current);
            current.clear();
            current_len = 0;
            if sentence_len <= max_len {
                current.push_str(sentence);
                current_len = sentence_len;
                continue;
            }
        }

        // the sentence alone is too long: cut it by character
        for c in sentence.chars() {
            if current_len + 1 > hard_len {
                chunks.push(format!("{current}{marker}"));
                current.clear();
                current_len = 0;
            }
            current.push(c);
            current_len += 1;
        }
    }

    push_trimmed(&mut chunks, &current);

    if chunks.is_empty() {
        return vec![text.chars().take(max_len).collect()];
    }
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("恩典夠用。", 2000), vec!["恩典夠用。"]);
    }

    #[test]
    fn thirty_sentences_split_on_boundaries() {
        let sentence = format!("{}。", "道".repeat(99));
        let text = sentence.repeat(30);
        let chunks = split_message(&text, 2000);

        assert_eq!(chunks.len(), 2);
        assert_eq!(len(&chunks[0]), 2000);
        assert_eq!(len(&chunks[1]), 1000);
        for chunk in &chunks {
            assert!(len(chunk) <= 2000);
            assert!(chunk.ends_with('。'));
        }
    }

    #[test]
    fn whitespace_between_sentences_is_dropped() {
        let chunks = split_message("One. Two. Three.", 9);
        assert_eq!(chunks, vec!["One.Two.", "Three."]);
    }

    #[test]
    fn oversized_sentence_is_cut_with_markers() {
        let text = "a".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks, vec!["aaaaaaa...", "aaaaaaa...", "aaaaaaa...", "aaaa"]);
        assert!(chunks.iter().all(|c| len(c) <= 10));
    }

    #[test]
    fn tiny_limits_cut_without_markers() {
        let text = "a".repeat(9);
        for max_len in 1..=3 {
            let chunks = split_message(&text, max_len);
            assert!(chunks.iter().all(|c| len(c) <= max_len), "{max_len}: {chunks:?}");
            assert_eq!(chunks.concat(), text);
        }
        assert_eq!(split_message("abcde", 2), vec!["ab", "cd", "e"]);
    }

    #[test]
    fn remainder_of_cut_sentence_keeps_accumulating() {
        let text = format!("{}。短句。", "x".repeat(12));
        let chunks = split_message(&text, 10);
        assert_eq!(chunks, vec!["xxxxxxx...", "xxxxx。短句。"]);
    }

    #[test]
    fn oversized_sentence_after_flush_is_still_cut() {
        let text = format!("Hi. {}.", "b".repeat(20));
        let chunks = split_message(&text, 10);
        assert_eq!(chunks[0], "Hi.");
        assert!(chunks.iter().all(|c| len(c) <= 10), "{chunks:?}");
    }

    #[test]
    fn content_is_preserved() {
        let text = "上帝是主權的。".repeat(40) + &"z".repeat(130) + "！";
        let chunks = split_message(&text, 50);
        let rebuilt: String = chunks
            .iter()
            .map(|c| c.strip_suffix(CONTINUATION).unwrap_or(c))
            .collect();
        assert_eq!(rebuilt, text);
        assert!(chunks.iter().all(|c| len(c) <= 50));
    }

    #[test]
    fn never_empty_for_non_empty_input() {
        assert_eq!(split_message("   ", 10), vec!["   "]);
        assert!(!split_message("x", 10).is_empty());
    }
}
