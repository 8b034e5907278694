use std::collections::VecDeque;

/// Bounded byte buffer that keeps only the most recent `capacity` bytes.
///
/// Eviction is byte-exact and independent of how the stream was chunked.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    capacity: usize,
    bytes: VecDeque<u8>,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            bytes: VecDeque::with_capacity(capacity.min(64 * 1024)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.capacity {
            self.bytes.clear();
            self.bytes.extend(&chunk[chunk.len() - self.capacity..]);
            return;
        }
        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        self.bytes.drain(..overflow);
        self.bytes.extend(chunk);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    /// Decodes the retained bytes, replacing invalid UTF-8 sequences. The result
    /// is cut again to `capacity` bytes, since each replacement character is
    /// wider than the byte it replaces.
    pub fn to_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.to_bytes()).into_owned();
        truncate_front(&text, self.capacity).to_string()
    }
}

/// Returns the suffix of `text` that fits in `max_bytes`, cut on a character boundary.
pub fn truncate_front(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_within_capacity_keeps_everything() {
        let mut tail = TailBuffer::new(10);
        tail.push(b"abc");
        tail.push(b"def");
        assert_eq!(tail.to_bytes(), b"abcdef");
    }

    #[test]
    fn push_evicts_oldest_bytes_first() {
        let mut tail = TailBuffer::new(5);
        tail.push(b"abc");
        tail.push(b"defg");
        assert_eq!(tail.to_bytes(), b"cdefg");
        assert_eq!(tail.len(), 5);
    }

    #[test]
    fn oversized_chunk_keeps_its_last_bytes() {
        let mut tail = TailBuffer::new(4);
        tail.push(b"xy");
        tail.push(b"0123456789");
        assert_eq!(tail.to_bytes(), b"6789");
    }

    #[test]
    fn retained_bytes_never_exceed_capacity_for_any_chunking() {
        let data: Vec<u8> = (0..=255u8).cycle().take(25_000).collect();
        for chunk_size in [1, 7, 999, 10_000, 10_001, 25_000] {
            let mut tail = TailBuffer::new(10_000);
            for chunk in data.chunks(chunk_size) {
                tail.push(chunk);
                assert!(tail.len() <= tail.capacity());
            }
            assert_eq!(tail.to_bytes(), &data[data.len() - 10_000..]);
        }
    }

    #[test]
    fn to_text_replaces_invalid_utf8() {
        let mut tail = TailBuffer::new(16);
        tail.push(&[b'o', b'k', 0xff, b'!']);
        assert_eq!(tail.to_text(), "ok\u{fffd}!");
    }

    #[test]
    fn decoded_text_stays_within_capacity() {
        let mut tail = TailBuffer::new(8);
        tail.push(&[0xff; 8]);
        let text = tail.to_text();
        assert!(text.len() <= 8);
        assert_eq!(text, "\u{fffd}\u{fffd}");
    }

    #[test]
    fn truncate_front_respects_char_boundaries() {
        assert_eq!(truncate_front("hello", 10), "hello");
        assert_eq!(truncate_front("hello", 3), "llo");
        // 'é' is two bytes; a cut through it moves forward to the next boundary.
        assert_eq!(truncate_front("aéb", 2), "b");
        assert_eq!(truncate_front("aéb", 3), "éb");
    }
}
