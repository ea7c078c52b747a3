/// Input received since the last complete line.
///
/// Bytes only leave the buffer as newline-terminated segments, or all at once
/// through [`LineBuffer::take_remainder`] at shutdown.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Remove and return the first complete line, without its `\n`.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(line)
    }

    /// Take whatever is left after the last newline.
    pub fn take_remainder(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut buf = LineBuffer::new();
        buf.extend(b"/comp");
        assert_eq!(buf.next_line(), None);

        buf.extend(b"act\n");
        assert_eq!(buf.next_line(), Some(b"/compact".to_vec()));
        assert!(buf.take_remainder().is_empty());
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut buf = LineBuffer::new();
        buf.extend(b"one\n\ntwo\nthr");

        assert_eq!(buf.next_line(), Some(b"one".to_vec()));
        assert_eq!(buf.next_line(), Some(Vec::new()));
        assert_eq!(buf.next_line(), Some(b"two".to_vec()));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.take_remainder(), b"thr".to_vec());
        assert!(buf.take_remainder().is_empty());
    }

    #[test]
    fn test_carriage_return_is_kept() {
        let mut buf = LineBuffer::new();
        buf.extend(b"dir\r\n");
        assert_eq!(buf.next_line(), Some(b"dir\r".to_vec()));
    }

    #[test]
    fn test_non_text_bytes_are_kept() {
        let mut buf = LineBuffer::new();
        buf.extend(&[0x00, 0xff, 0x1b, b'\n', 0xfe]);
        assert_eq!(buf.next_line(), Some(vec![0x00, 0xff, 0x1b]));
        assert_eq!(buf.take_remainder(), vec![0xfe]);
    }
}
