/// Longest chunk handed to the synthesizer in one call.
pub const DEFAULT_CHUNK_LEN: usize = 150;

/// Split text into sentences, breaking after `.`, `!` or `?` when followed
/// by whitespace.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next, next_ch)) = chars.peek() {
            if next_ch.is_whitespace() {
                let sentence = text[start..next].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next;
            }
        } else {
            let sentence = text[start..i + ch.len_utf8()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = text.len();
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// Group whole sentences into chunks of at most `max_len` characters.
///
/// A sentence longer than `max_len` becomes a chunk of its own; sentences
/// are never cut.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        let needed = if current.is_empty() {
            sentence.chars().count()
        } else {
            current.chars().count() + 1 + sentence.chars().count()
        };

        if needed <= max_len {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(sentence);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
