/// Maximum characters per outgoing message.
pub const MAX_CHUNK_CHARS: usize = 4000;

/// Split text into pieces of at most `max_chars` characters.
///
/// Counts chars, not bytes, so multi-byte text is never cut mid-character.
/// Empty input yields no chunks.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for c in text.chars() {
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
