// LogStitch - core/decode.rs
//
// Byte stream -> text lines.
//
// Bytes are read in fixed-size chunks and decoded incrementally with
// encoding_rs, so multi-byte sequences split across chunk boundaries decode
// correctly. A BOM overrides the declared encoding. Malformed sequences are
// replaced with U+FFFD rather than failing the stream. Lines end at `\n`,
// `\r\n` or a lone `\r`.

use crate::util::constants;
use crate::util::error::ConfigError;
use encoding_rs::{CoderResult, Decoder, Encoding};
use std::io::{self, Read};

/// Resolve a WHATWG encoding label (`utf-8`, `utf-16le`, `windows-1252`,
/// `latin1`, ...).
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, ConfigError> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| ConfigError::UnknownEncoding {
        label: label.to_string(),
    })
}

/// Lines of decoded text from a byte source.
pub struct LineSource<R> {
    reader: R,
    decoder: Decoder,
    chunk: Vec<u8>,
    /// Decoded text not yet handed out. `consumed` bytes of it already were.
    pending: String,
    consumed: usize,
    /// `pending[consumed..scanned]` holds no line terminator.
    scanned: usize,
    eof: bool,
    reported_replacement: bool,
}

impl<R: Read> LineSource<R> {
    pub fn new(reader: R, encoding: &'static Encoding) -> Self {
        Self::with_chunk_size(reader, encoding, constants::DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, encoding: &'static Encoding, chunk_size: usize) -> Self {
        Self {
            reader,
            decoder: encoding.new_decoder(),
            chunk: vec![0; chunk_size.max(1)],
            pending: String::new(),
            consumed: 0,
            scanned: 0,
            eof: false,
            reported_replacement: false,
        }
    }

    /// The next line without its terminator, or `None` at end of input.
    ///
    /// A final line without a terminator is still returned.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let start = self.scanned.max(self.consumed);
            if let Some(pos) = self.pending[start..].find(['\n', '\r']) {
                let end = start + pos;
                let terminator = if self.pending.as_bytes()[end] == b'\n' {
                    1
                } else {
                    match self.pending.as_bytes().get(end + 1).copied() {
                        Some(b'\n') => 2,
                        Some(_) => 1,
                        None if self.eof => 1,
                        // the `\n` of a CRLF may be in the next chunk
                        None => {
                            self.scanned = end;
                            self.fill()?;
                            continue;
                        }
                    }
                };
                let line = self.pending[self.consumed..end].to_string();
                self.consumed = end + terminator;
                self.scanned = self.consumed;
                return Ok(Some(line));
            }
            self.scanned = self.pending.len();
            if self.eof {
                if self.consumed < self.pending.len() {
                    let line = self.pending[self.consumed..].to_string();
                    self.consumed = self.pending.len();
                    return Ok(Some(line));
                }
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Read one chunk and append its decoded text to `pending`.
    fn fill(&mut self) -> io::Result<()> {
        self.pending.drain(..self.consumed);
        self.scanned -= self.consumed.min(self.scanned);
        self.consumed = 0;

        let read = loop {
            match self.reader.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        let last = read == 0;

        let mut src = &self.chunk[..read];
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len() * 3 + 16);
            self.pending.reserve(needed);
            let (result, used, replaced) = self.decoder.decode_to_string(src, &mut self.pending, last);
            src = &src[used..];

            if replaced && !self.reported_replacement {
                self.reported_replacement = true;
                tracing::warn!(
                    encoding = self.decoder.encoding().name(),
                    "Malformed byte sequences replaced while decoding input"
                );
            }
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }

        if last {
            self.eof = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines_of(bytes: &[u8], encoding: &'static Encoding, chunk: usize) -> Vec<String> {
        let mut source = LineSource::with_chunk_size(Cursor::new(bytes.to_vec()), encoding, chunk);
        let mut out = Vec::new();
        while let Some(line) = source.next_line().unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_splits_lf_and_crlf() {
        let lines = lines_of(b"one\r\ntwo\n\nthree", encoding_rs::UTF_8, 64);
        assert_eq!(lines, vec!["one", "two", "", "three"]);
    }

    #[test]
    fn test_lone_carriage_return_ends_a_line() {
        let lines = lines_of(b"one\rtwo\r\nthree\r", encoding_rs::UTF_8, 64);
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(lines_of(b"a\r\rb", encoding_rs::UTF_8, 64), vec!["a", "", "b"]);
    }

    #[test]
    fn test_crlf_split_across_chunks_is_one_terminator() {
        for chunk in 1..=4 {
            let lines = lines_of(b"ab\r\ncd\r\n\ref", encoding_rs::UTF_8, chunk);
            assert_eq!(lines, vec!["ab", "cd", "", "ef"], "chunk size {chunk}");
        }
    }

    #[test]
    fn test_long_line_across_many_chunks() {
        let mut bytes = "x".repeat(100_000).into_bytes();
        bytes.extend_from_slice(b"\nshort\n");
        let lines = lines_of(&bytes, encoding_rs::UTF_8, 7);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 100_000);
        assert_eq!(lines[1], "short");
    }

    #[test]
    fn test_trailing_newline_adds_no_line() {
        assert_eq!(lines_of(b"a\nb\n", encoding_rs::UTF_8, 64), vec!["a", "b"]);
        assert!(lines_of(b"", encoding_rs::UTF_8, 64).is_empty());
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "héllo wörld\n日本語\n";
        // one byte per read forces every sequence across a chunk boundary
        let lines = lines_of(text.as_bytes(), encoding_rs::UTF_8, 1);
        assert_eq!(lines, vec!["héllo wörld", "日本語"]);
    }

    #[test]
    fn test_utf16le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "first\r\nsecond ü\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        // declared UTF-8, but the BOM wins
        let lines = lines_of(&bytes, encoding_rs::UTF_8, 3);
        assert_eq!(lines, vec!["first", "second ü"]);
    }

    #[test]
    fn test_windows_1252() {
        let bytes = b"caf\xe9 \x80\n";
        let lines = lines_of(bytes, encoding_rs::WINDOWS_1252, 64);
        assert_eq!(lines, vec!["café €"]);
    }

    #[test]
    fn test_malformed_utf8_is_replaced() {
        let lines = lines_of(b"ok\xff\n", encoding_rs::UTF_8, 64);
        assert_eq!(lines, vec!["ok\u{FFFD}"]);
    }

    #[test]
    fn test_resolve_encoding() {
        assert_eq!(resolve_encoding("utf-8").unwrap(), encoding_rs::UTF_8);
        assert_eq!(resolve_encoding(" Latin1 ").unwrap(), encoding_rs::WINDOWS_1252);
        assert_eq!(resolve_encoding("UTF-16LE").unwrap(), encoding_rs::UTF_16LE);
        assert!(matches!(
            resolve_encoding("klingon"),
            Err(ConfigError::UnknownEncoding { .. })
        ));
    }

    struct Interrupting {
        inner: Cursor<Vec<u8>>,
        interrupted: bool,
    }

    impl Read for Interrupting {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let reader = Interrupting {
            inner: Cursor::new(b"x\n".to_vec()),
            interrupted: false,
        };
        let mut source = LineSource::new(reader, encoding_rs::UTF_8);
        assert_eq!(source.next_line().unwrap().as_deref(), Some("x"));
        assert_eq!(source.next_line().unwrap(), None);
    }
}
