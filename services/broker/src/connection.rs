//! Connection loop: bytes in, frames through the dispatcher, frames out
//!
//! Reads are appended to a [`ByteCursor`]; the codec is polled until it
//! reports an incomplete frame, so a frame split across any number of reads
//! is decoded exactly once. A framing error sends `connection.close` with
//! `FRAME_ERROR` and ends the connection. The stream is never resynchronized.

use crate::dispatch::{connection_close, Dispatcher, Flow};
use crate::{BrokerError, BrokerResult};
use codec::{ByteCursor, Frame, FrameCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Per-read buffer size
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Serve one client until it closes, a close handshake completes, or the
/// byte stream turns out to be corrupt
pub async fn serve_connection<S>(
    mut stream: S,
    codec: FrameCodec,
    mut dispatcher: Dispatcher,
) -> BrokerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut input = ByteCursor::with_capacity(READ_BUFFER_SIZE);
    let mut read_buf = vec![0u8; READ_BUFFER_SIZE];
    let mut replies: Vec<Frame> = Vec::new();

    loop {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            debug!(
                "Peer closed connection ({} unread bytes)",
                input.available()
            );
            return Ok(());
        }
        input.extend_from_slice(&read_buf[..n]);

        let mut flow = Flow::Continue;
        while flow == Flow::Continue {
            match codec.decode(&mut input) {
                Ok(Some(frame)) => {
                    trace!("Received {}", frame);
                    flow = dispatcher.dispatch(frame, &mut replies);
                }
                Ok(None) => break,
                Err(e) => {
                    let error = BrokerError::from(e);
                    warn!("Closing connection after framing error: {}", error);
                    replies.push(connection_close(&error));
                    write_frames(&mut stream, &codec, &mut replies).await?;
                    return Err(error);
                }
            }
        }
        input.compact();

        write_frames(&mut stream, &codec, &mut replies).await?;
        if flow == Flow::Close {
            stream.shutdown().await?;
            return Ok(());
        }
    }
}

async fn write_frames<S>(
    stream: &mut S,
    codec: &FrameCodec,
    replies: &mut Vec<Frame>,
) -> BrokerResult<()>
where
    S: AsyncWrite + Unpin,
{
    if replies.is_empty() {
        return Ok(());
    }
    let mut output = ByteCursor::new();
    for frame in replies.drain(..) {
        trace!("Sending {}", frame);
        codec.encode(&frame, &mut output)?;
    }
    stream.write_all(output.as_slice()).await?;
    stream.flush().await?;
    Ok(())
}
