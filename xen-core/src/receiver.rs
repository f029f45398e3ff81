//! Incremental frame receiver: streams bytes in, yields fully-framed
//! payloads out, tolerating arbitrary chunking of the input.

use crate::errors::XenError;

const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
const COMPACT_THRESHOLD: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    AwaitingHeader,
    AwaitingBody(usize),
}

/// Buffers incoming bytes and produces complete frame payloads as they
/// become available. One `Receiver` belongs to exactly one `Channel`.
#[derive(Debug)]
pub struct Receiver {
    buf: Vec<u8>,
    pos: usize,
    state: ParseState,
    max_frame_size: usize,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Receiver {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            state: ParseState::AwaitingHeader,
            max_frame_size,
        }
    }

    /// Append `bytes` and return every payload that became complete as a
    /// result. Returns zero, one, or many payloads per call.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, XenError> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            match self.state {
                ParseState::AwaitingHeader => {
                    if self.pos >= self.buf.len() {
                        break;
                    }
                    if self.buf[self.pos] != b'@' {
                        return Err(XenError::Protocol("missing begin marker".to_string()));
                    }

                    let mut i = self.pos + 1;
                    let mut digit_count = 0usize;
                    let mut size: usize = 0;
                    let mut need_more = false;
                    loop {
                        if i >= self.buf.len() {
                            need_more = true;
                            break;
                        }
                        match self.buf[i] {
                            b':' => break,
                            b'0'..=b'9' => {
                                size = size
                                    .saturating_mul(10)
                                    .saturating_add((self.buf[i] - b'0') as usize);
                                digit_count += 1;
                                i += 1;
                            }
                            _ => {
                                return Err(XenError::Protocol(
                                    "unexpected byte in header".to_string(),
                                ))
                            }
                        }
                    }
                    if need_more {
                        break;
                    }
                    if digit_count == 0 {
                        return Err(XenError::Protocol("header has no digits".to_string()));
                    }
                    if size > self.max_frame_size {
                        return Err(XenError::Protocol("oversized frame".to_string()));
                    }

                    self.pos = i + 1; // past the colon
                    self.state = ParseState::AwaitingBody(size);
                }
                ParseState::AwaitingBody(n) => {
                    if self.buf.len() - self.pos >= n {
                        let payload = self.buf[self.pos..self.pos + n].to_vec();
                        self.pos += n;
                        self.state = ParseState::AwaitingHeader;
                        out.push(payload);
                    } else {
                        break;
                    }
                }
            }
        }

        self.compact();
        Ok(out)
    }

    /// Discard the already-consumed prefix once it's grown large enough to
    /// matter, so a long-lived connection doesn't keep every byte it ever
    /// received resident in the buffer.
    fn compact(&mut self) {
        if self.pos > COMPACT_THRESHOLD && self.pos * 2 > self.buf.len() {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = format!("@{}:", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn single_frame_whole() {
        let mut r = Receiver::default();
        let out = r.feed(&frame(b"hello")).unwrap();
        assert_eq!(out, vec![b"hello".to_vec()]);
    }

    #[test]
    fn zero_length_payload() {
        let mut r = Receiver::default();
        let out = r.feed(b"@0:").unwrap();
        assert_eq!(out, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn header_prefix_needs_more_data() {
        let mut r = Receiver::default();
        assert_eq!(r.feed(b"@").unwrap(), Vec::<Vec<u8>>::new());
        assert_eq!(r.feed(b"5:").unwrap(), Vec::<Vec<u8>>::new());
        assert_eq!(r.feed(b"hello").unwrap(), vec![b"hello".to_vec()]);
    }

    #[test]
    fn at_zero_with_no_colon_stays_awaiting_header() {
        let mut r = Receiver::default();
        let out = r.feed(b"@0").unwrap();
        assert!(out.is_empty());
        assert_eq!(r.state, ParseState::AwaitingHeader);
    }

    #[test]
    fn zero_digit_header_is_protocol_error() {
        let mut r = Receiver::default();
        assert!(matches!(r.feed(b"@:x"), Err(XenError::Protocol(_))));
    }

    #[test]
    fn missing_begin_marker_is_protocol_error() {
        let mut r = Receiver::default();
        assert!(matches!(r.feed(b"!5:hello"), Err(XenError::Protocol(_))));
    }

    #[test]
    fn oversized_frame_is_protocol_error() {
        let mut r = Receiver::new(4);
        assert!(matches!(r.feed(b"@10:"), Err(XenError::Protocol(_))));
    }

    #[test]
    fn multiple_frames_in_one_feed() {
        let mut r = Receiver::default();
        let mut buf = frame(b"one");
        buf.extend(frame(b""));
        buf.extend(frame(b"three"));
        let out = r.feed(&buf).unwrap();
        assert_eq!(out, vec![b"one".to_vec(), Vec::new(), b"three".to_vec()]);
    }

    #[test]
    fn chunking_invariance_every_split_point() {
        let mut whole = frame(b"CMD:1:hi");
        whole.extend(frame(b"EVT:2:x"));
        whole.extend(frame(b""));
        whole.extend(frame(b"a longer payload with stuff in it"));

        let expected = {
            let mut r = Receiver::default();
            r.feed(&whole).unwrap()
        };

        for split in 0..=whole.len() {
            let (a, b) = whole.split_at(split);
            let mut r = Receiver::default();
            let mut got = r.feed(a).unwrap();
            got.extend(r.feed(b).unwrap());
            assert_eq!(got, expected, "mismatch splitting at {split}");
        }
    }

    #[test]
    fn byte_by_byte_chunking() {
        let whole = frame(b"chunked byte by byte");
        let mut r = Receiver::default();
        let mut out = Vec::new();
        for byte in &whole {
            out.extend(r.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(out, vec![b"chunked byte by byte".to_vec()]);
    }

    #[test]
    fn leading_zeros_are_accepted() {
        let mut r = Receiver::default();
        let out = r.feed(b"@007:abcdefg").unwrap();
        assert_eq!(out, vec![b"abcdefg".to_vec()]);
    }

    #[test]
    fn compaction_does_not_lose_data() {
        let mut r = Receiver::new(1 << 20);
        let mut total = Vec::new();
        for i in 0..2000u32 {
            let payload = format!("msg-{i}").into_bytes();
            total.push(payload);
        }
        let mut wire = Vec::new();
        for p in &total {
            wire.extend(frame(p));
        }
        let out = r.feed(&wire).unwrap();
        assert_eq!(out, total);
    }
}
