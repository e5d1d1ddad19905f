// LogStitch - platform/fs.rs
//
// Input sources: files and stdin, plus non-destructive sampling of the first
// lines for format detection.

use crate::core::decode::LineSource;
use crate::util::constants;
use crate::util::error::LogStitchError;
use encoding_rs::Encoding;
use std::io::{self, Cursor, Read};
use std::path::Path;

/// Open `path` for reading, or stdin when `path` is `None`.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn Read + Send>, LogStitchError> {
    match path {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| LogStitchError::Io {
                path: path.to_path_buf(),
                operation: "open",
                source: e,
            })?;
            tracing::debug!(path = %path.display(), "Opened input file");
            Ok(Box::new(file))
        }
        None => {
            tracing::debug!("Reading from stdin");
            Ok(Box::new(io::stdin()))
        }
    }
}

/// The first lines of an input, and a reader that still yields every byte.
pub struct Sampled<R> {
    pub lines: Vec<String>,
    pub reader: io::Chain<Cursor<Vec<u8>>, R>,
}

/// Read up to `max_lines` decoded lines from the start of `reader`.
///
/// The bytes consumed are kept and replayed by the returned reader, so this
/// works on pipes as well as files. At most `MAX_SAMPLE_BYTES` are buffered.
pub fn sample_lines<R: Read>(
    mut reader: R,
    encoding: &'static Encoding,
    max_lines: usize,
) -> io::Result<Sampled<R>> {
    let mut prefix: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; constants::DEFAULT_CHUNK_SIZE];
    let mut newlines = 0usize;
    let mut eof = false;

    while newlines < max_lines && prefix.len() < constants::MAX_SAMPLE_BYTES {
        let read = match reader.read(&mut chunk) {
            Ok(0) => {
                eof = true;
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let bytes = &chunk[..read];
        newlines += bytes
            .iter()
            .enumerate()
            .filter(|&(i, &b)| b == b'\n' || (b == b'\r' && bytes.get(i + 1) != Some(&b'\n')))
            .count();
        prefix.extend_from_slice(&chunk[..read]);
    }

    let mut lines = Vec::new();
    {
        let mut source = LineSource::new(Cursor::new(prefix.as_slice()), encoding);
        while let Some(line) = source.next_line()? {
            lines.push(line);
        }
    }
    // the last line may continue past the sampled bytes
    if !eof && !matches!(prefix.last(), Some(b'\n' | b'\r')) {
        lines.pop();
    }
    lines.truncate(max_lines);

    tracing::debug!(
        lines = lines.len(),
        bytes = prefix.len(),
        "Sampled input for detection"
    );

    Ok(Sampled {
        lines,
        reader: Cursor::new(prefix).chain(reader),
    })
}
