//! Stream pumps: one task per captured child stream.
//!
//! A pump owns its sink for the lifetime of the capture, which is what makes
//! the single-writer guarantee hold without any locking.

use crate::sink::RotatingLogSink;
use crate::StreamType;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const READ_BUF_SIZE: usize = 8192;

/// Spawn a pump task that copies a child stream into a sink until EOF or
/// cancellation, then flushes.
pub fn spawn_pump<R>(
    reader: R,
    sink: RotatingLogSink,
    instance_id: String,
    stream: StreamType,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(pump(reader, sink, instance_id, stream, cancel))
}

async fn pump<R>(
    mut reader: R,
    mut sink: RotatingLogSink,
    instance_id: String,
    stream: StreamType,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut total_bytes: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => break, // EOF, child closed the pipe
                Ok(n) => {
                    if let Err(e) = sink.write(&buf[..n]) {
                        tracing::warn!(
                            instance = %instance_id,
                            %stream,
                            error = %e,
                            "log write failed, stopping capture"
                        );
                        break;
                    }
                    total_bytes += n as u64;
                }
                Err(e) => {
                    tracing::warn!(
                        instance = %instance_id,
                        %stream,
                        error = %e,
                        "stream read failed, stopping capture"
                    );
                    break;
                }
            }
        }
    }

    if let Err(e) = sink.close() {
        tracing::warn!(instance = %instance_id, %stream, error = %e, "log flush failed");
    }

    tracing::debug!(
        instance = %instance_id,
        %stream,
        bytes = total_bytes,
        "log capture finished"
    );
}
