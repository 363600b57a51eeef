use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keeps the last `cap` bytes written to it. Shared by the stdout and stderr
/// pumps of one agent run, so the capture is interleaved in arrival order.
#[derive(Debug)]
pub struct RingBytes {
    inner: Mutex<Inner>,
    cap: usize,
}

#[derive(Debug, Default)]
struct Inner {
    buf: VecDeque<u8>,
    dropped: u64,
}

impl RingBytes {
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(cap.min(64 * 1024)),
                dropped: 0,
            }),
            cap,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push(&self, data: &[u8]) {
        let mut g = self.lock();
        let data = if data.len() > self.cap {
            g.dropped += (data.len() - self.cap) as u64;
            &data[data.len() - self.cap..]
        } else {
            data
        };
        let overflow = g.buf.len().saturating_add(data.len()).saturating_sub(self.cap);
        if overflow > 0 {
            g.buf.drain(..overflow);
            g.dropped += overflow as u64;
        }
        g.buf.extend(data);
    }

    /// Bytes discarded from the front so far.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let g = self.lock();
        let mut vec = Vec::with_capacity(g.buf.len());
        vec.extend(g.buf.iter().copied());
        vec
    }

    /// Captured bytes, prefixed with a marker line when the head was cut.
    pub fn to_log(&self) -> Vec<u8> {
        let dropped = self.dropped();
        let mut out = Vec::new();
        if dropped > 0 {
            out.extend_from_slice(format!("[... {dropped} earlier bytes dropped ...]\n").as_bytes());
        }
        out.extend(self.to_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_tail_and_counts_dropped() {
        let ring = RingBytes::new(4);
        ring.push(b"ab");
        ring.push(b"cdef");
        assert_eq!(ring.to_bytes(), b"cdef");
        assert_eq!(ring.dropped(), 2);

        ring.push(b"0123456789");
        assert_eq!(ring.to_bytes(), b"6789");
        assert_eq!(ring.dropped(), 12);
        assert!(ring.to_log().starts_with(b"[... 12 earlier bytes dropped ...]\n"));
    }

    #[test]
    fn small_output_is_untouched() {
        let ring = RingBytes::new(1024);
        ring.push(b"hello\n");
        assert_eq!(ring.to_log(), b"hello\n");
    }
}
