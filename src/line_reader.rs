use std::io;

use bytes::{Bytes, BytesMut};
use itertools::Itertools;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// More than the allowed number of bytes arrived without a CRLF.
    #[error("line exceeds {max_len} bytes")]
    LineTooLong { max_len: usize },
}

/// Splits a byte stream into CRLF-terminated request lines, refusing to
/// buffer an unterminated line beyond a fixed length.
pub struct LineReader<T: AsyncRead + Unpin> {
    /// Bytes read so far that don't yet form a complete line.
    buf: BytesMut,
    /// Position in `buf` before which no CRLF can start.
    scan_from: usize,
    /// Longest line accepted, not counting the CRLF.
    max_len: usize,
    reader: T,
    /// An error from the underlying reader, held back until every complete
    /// line already buffered has been returned.
    pending_error: Option<io::Error>,
}

impl<T: AsyncRead + Unpin> LineReader<T> {
    pub fn new(reader: T, max_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scan_from: 0,
            max_len,
            reader,
            pending_error: None,
        }
    }

    /// Returns the next line without its CRLF, or None once the stream ends.
    /// A partial line left at end of stream is discarded.
    ///
    /// Cancel-safe: the only await point is a `read_buf` into the internal
    /// buffer, so a cancelled call loses nothing.
    pub async fn read_line(&mut self) -> Result<Option<Bytes>, ReadError> {
        loop {
            // Scanning restarts one byte early so a CR that ended the last
            // read still pairs with an LF that begins this one. Pipelined
            // lines are all handed out before reading again.
            if let Some(pos) = self
                .buf
                .iter()
                .skip(self.scan_from)
                .tuple_windows::<(_, _)>()
                .position(|pair| pair == (&b'\r', &b'\n'))
            {
                let end = self.scan_from + pos;
                self.scan_from = 0;

                if end > self.max_len {
                    return Err(ReadError::LineTooLong {
                        max_len: self.max_len,
                    });
                }

                let mut line = self.buf.split_to(end + 2);
                line.truncate(end);

                return Ok(Some(line.freeze()));
            }

            // Allow for a CR sitting at the very end, awaiting its LF.
            if self.buf.len() > self.max_len.saturating_add(1) {
                return Err(ReadError::LineTooLong {
                    max_len: self.max_len,
                });
            }

            let n_read = match self.reader.read_buf(&mut self.buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.pending_error = Some(e);
                    0
                },
            };

            self.scan_from = self.buf.len().saturating_sub(n_read + 1);

            // Nothing read means end of stream (or a failed read): no further
            // line can be completed.
            if n_read == 0 {
                return match self.pending_error.take() {
                    Some(e) => Err(e.into()),
                    None => Ok(None),
                };
            }
        }
    }
}
