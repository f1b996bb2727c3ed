//! Newline framing over a blocking byte stream.
//!
//! Serial reads return arbitrary fragments; a record may arrive split across
//! several reads or several records may arrive in one. Only complete lines
//! leave the framer.

use std::io::{ErrorKind, Read};

use crate::error::{CResult, ConnectorError};

pub struct LineFramer<R> {
    reader: R,
    endpoint: String,
    pending: Vec<u8>,
    chunk: Vec<u8>,
    /// Unterminated input beyond this is dropped as garbage.
    max_pending: usize,
}

impl<R: Read> LineFramer<R> {
    pub fn new(reader: R, endpoint: &str, chunk_size: usize, max_pending: usize) -> Self {
        LineFramer {
            reader,
            endpoint: endpoint.to_string(),
            pending: Vec::new(),
            chunk: vec![0u8; chunk_size.max(1)],
            max_pending,
        }
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Do one read and hand every completed, non-blank line to `on_line`.
    ///
    /// A read timeout is not an error and yields zero lines. End of stream
    /// and any other I/O failure mean the endpoint is gone.
    pub fn poll(&mut self, mut on_line: impl FnMut(String)) -> CResult<usize> {
        let n = match self.reader.read(&mut self.chunk) {
            Ok(0) => {
                return Err(ConnectorError::transport(&self.endpoint, "end of stream"));
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                return Ok(0);
            }
            Err(e) => return Err(ConnectorError::transport(&self.endpoint, e)),
        };
        self.pending.extend_from_slice(&self.chunk[..n]);

        let mut emitted = 0;
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            on_line(line.to_string());
            emitted += 1;
        }

        if self.pending.len() > self.max_pending {
            log::warn!(
                "{}: discarding {} bytes with no line terminator",
                self.endpoint,
                self.pending.len()
            );
            self.pending.clear();
        }
        Ok(emitted)
    }
}
