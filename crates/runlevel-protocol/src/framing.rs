//! Newline-delimited JSON framing for control messages.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Upper bound on a single encoded message, newline included.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Reads one newline-terminated JSON message and decodes it.
///
/// Returns `Ok(None)` when the peer closed the stream before sending any
/// bytes. A final line without a trailing newline is still accepted.
///
/// # Errors
///
/// Returns [`FramingError`] on IO failure, when the message exceeds
/// [`MAX_MESSAGE_BYTES`], or when it is not valid JSON for `T`.
pub fn read_line<T, R>(reader: &mut R) -> Result<Option<T>, FramingError>
where
    T: DeserializeOwned,
    R: Read,
{
    let Some(line) = read_raw_line(reader)? else {
        return Ok(None);
    };
    serde_json::from_slice(&line)
        .map(Some)
        .map_err(FramingError::Decode)
}

/// Encodes `message` as one JSON line and flushes it.
///
/// # Errors
///
/// Returns [`FramingError`] when encoding or writing fails.
pub fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), FramingError>
where
    T: Serialize,
    W: Write,
{
    let mut payload = serde_json::to_vec(message).map_err(FramingError::Encode)?;
    payload.push(b'\n');
    writer.write_all(&payload).map_err(FramingError::Io)?;
    writer.flush().map_err(FramingError::Io)
}

fn read_raw_line<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, FramingError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let bytes_read = read_chunk_with_retry(reader, &mut chunk)?;
        if bytes_read == 0 {
            return Ok((!buffer.is_empty()).then_some(buffer));
        }
        let received = chunk.get(..bytes_read).unwrap_or_default();
        if let Some(position) = received.iter().position(|byte| *byte == b'\n') {
            buffer.extend_from_slice(received.get(..position).unwrap_or_default());
            enforce_limit(buffer.len())?;
            return Ok(Some(buffer));
        }
        buffer.extend_from_slice(received);
        enforce_limit(buffer.len())?;
    }
}

fn read_chunk_with_retry<R: Read>(reader: &mut R, chunk: &mut [u8]) -> Result<usize, FramingError> {
    loop {
        match reader.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(FramingError::Io(error)),
        }
    }
}

const fn enforce_limit(size: usize) -> Result<(), FramingError> {
    if size > MAX_MESSAGE_BYTES {
        return Err(FramingError::TooLarge {
            limit: MAX_MESSAGE_BYTES,
        });
    }
    Ok(())
}

/// Errors raised while framing control messages.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Reading or writing the stream failed.
    #[error("control stream IO failed: {0}")]
    Io(#[source] io::Error),
    /// The peer sent more than the permitted message size.
    #[error("message exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// The message was not valid JSON for the expected type.
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),
    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{Reply, Request};

    #[test]
    fn reads_first_line_only() {
        let mut input = Cursor::new(b"{\"command\":\"status\"}\n{\"command\":\"help\"}\n".to_vec());
        let request: Option<Request> = read_line(&mut input).expect("read request");
        assert_eq!(request.map(|request| request.command).as_deref(), Some("status"));
    }

    #[test]
    fn empty_stream_yields_none() {
        let mut input = Cursor::new(Vec::new());
        let reply: Option<Reply> = read_line(&mut input).expect("read reply");
        assert!(reply.is_none());
    }

    #[test]
    fn oversized_messages_are_rejected() {
        let mut input = Cursor::new(vec![b'x'; MAX_MESSAGE_BYTES + 10]);
        let error = read_line::<Request, _>(&mut input).expect_err("limit enforced");
        assert!(matches!(error, FramingError::TooLarge { .. }));
    }

    #[test]
    fn written_messages_end_with_newline() {
        let mut output = Vec::new();
        write_message(&mut output, &Reply::text("DONE")).expect("write reply");
        assert_eq!(output.last(), Some(&b'\n'));
    }
}
