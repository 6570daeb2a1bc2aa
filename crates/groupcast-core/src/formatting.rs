//! Text helpers for outgoing Telegram messages.

/// Split plain text into chunks of at most `limit` bytes.
///
/// Breaks on line boundaries where possible; a single line longer than the
/// limit is cut on a char boundary.
pub fn split_text_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut chunk = String::new();

    for line in text.split_inclusive('\n') {
        if chunk.len() + line.len() <= limit {
            chunk.push_str(line);
            continue;
        }
        if !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
        }

        let mut rest = line;
        while rest.len() > limit {
            let cut = floor_char_boundary(rest, limit);
            out.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        chunk.push_str(rest);
    }

    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    // Limit smaller than the first char: take that char whole.
    if i == 0 {
        return s.chars().next().map(char::len_utf8).unwrap_or(0);
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text_chunks("hello", 10), vec!["hello"]);
    }

    #[test]
    fn splits_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_text_chunks(text, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn long_line_is_cut_on_char_boundary() {
        let text = "ééééé"; // 10 bytes
        let chunks = split_text_chunks(text, 3);
        assert!(chunks.iter().all(|c| c.len() <= 3));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn every_chunk_respects_limit() {
        let text = (0..500)
            .map(|i| format!("Group -100{i}: Forbidden: bot was kicked"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_text_chunks(&text, 4000);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 4000));
        assert_eq!(chunks.concat(), text);
    }
}
