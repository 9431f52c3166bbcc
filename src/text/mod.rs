pub mod chunk;
pub mod markdown;

pub use chunk::{chunk, DEFAULT_CHUNK_LEN};

/// Turn a tutor answer into plain text suitable for speaking.
///
/// Markdown is stripped and lines are joined into one paragraph. A line that
/// does not end in punctuation (a heading or list item) gets a full stop so
/// the voice pauses there.
pub fn prepare(input: &str) -> String {
    let stripped = markdown::strip(input);
    let mut output = String::new();

    for line in stripped.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            continue;
        }

        if !output.is_empty() {
            output.push(' ');
        }
        output.push_str(&line);

        if !line.ends_with(['.', '!', '?', ':', ';', ',']) {
            output.push('.');
        }
    }

    output
}
