//! Line protocol for the touch controller.
//!
//! The controller sends newline- or CR-terminated ASCII tokens. Bytes
//! arrive in arbitrary chunks from the serial driver, so assembly has to
//! be independent of where the chunk boundaries fall.

/// Accumulates raw serial bytes into normalized command lines.
///
/// A line is complete at the first CR or LF. Completed lines are trimmed
/// and upper-cased; lines that are empty after trimming are dropped.
/// Partial lines persist until more bytes arrive.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes, returning every line it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\r' || byte == b'\n' {
                if !self.buf.is_empty() {
                    let raw = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    let line = raw.trim().to_uppercase();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
            } else {
                self.buf.push(byte);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(assembler: &mut LineAssembler, chunks: &[&[u8]]) -> Vec<String> {
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(assembler.push(chunk));
        }
        lines
    }

    #[test]
    fn test_single_chunk() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.push(b"PLAY1\n"), vec!["PLAY1"]);
    }

    #[test]
    fn test_chunking_independence() {
        let stream = b"play1\r\nSTOP\n  play2  \rjunk";
        let whole = collect(&mut LineAssembler::new(), &[stream]);

        // Same bytes, one at a time
        let mut assembler = LineAssembler::new();
        let mut bytewise = Vec::new();
        for byte in stream {
            bytewise.extend(assembler.push(std::slice::from_ref(byte)));
        }

        assert_eq!(whole, vec!["PLAY1", "STOP", "PLAY2"]);
        assert_eq!(bytewise, whole);
    }

    #[test]
    fn test_partial_line_persists() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"PLA").is_empty());
        assert!(assembler.push(b"Y3").is_empty());
        assert_eq!(assembler.push(b"\n"), vec!["PLAY3"]);
    }

    #[test]
    fn test_whitespace_only_line_is_dropped() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"   \t \n").is_empty());
    }

    #[test]
    fn test_crlf_is_one_terminator() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.push(b"stop\r\nstop\r\n"), vec!["STOP", "STOP"]);
    }

    #[test]
    fn test_normalization() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.push(b"  pLaY2 \n"), vec!["PLAY2"]);
    }
}
