use std::{
    io::{self, Error, ErrorKind},
    time::Duration,
};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tunnel_relay_proto::shared::ResponseRef;

/// Writes a response as a single frame, giving up if it takes longer than `write_timeout`.
///
/// On timeout, part of the frame may have been written.
pub async fn write_response<W>(writer: &mut W, response: ResponseRef<'_>, write_timeout: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let buf = response.encode()?;

    let write = async {
        writer.write_all(&buf).await?;
        writer.flush().await
    };

    match tokio::time::timeout(write_timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(Error::new(ErrorKind::TimedOut, "Timed out writing response")),
    }
}

/// Shuts down the writing side of a connection, so the peer sees the end of the stream.
pub async fn shutdown_connection<W>(writer: &mut W, write_timeout: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match tokio::time::timeout(write_timeout, writer.shutdown()).await {
        Ok(result) => result,
        Err(_) => Err(Error::new(ErrorKind::TimedOut, "Timed out shutting down connection")),
    }
}

#[cfg(test)]
mod tests {
    use std::{io::ErrorKind, time::Duration};

    use tokio::io::AsyncReadExt;
    use tunnel_relay_proto::shared::ResponseRef;

    use super::{shutdown_connection, write_response};

    #[tokio::test]
    async fn test_write_then_shutdown() {
        let (mut ours, mut theirs) = tokio::io::duplex(64);
        write_response(&mut ours, ResponseRef::bad_request(3), Duration::from_secs(1)).await.unwrap();
        shutdown_connection(&mut ours, Duration::from_secs(1)).await.unwrap();

        let mut received = Vec::new();
        theirs.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, ResponseRef::bad_request(3).encode().unwrap());
    }

    #[tokio::test]
    async fn test_write_timeout() {
        // Nobody reads from the other end, so a write larger than the pipe never completes.
        let (mut ours, _theirs) = tokio::io::duplex(8);
        let body = [0u8; 64];
        let response = ResponseRef::new(tunnel_relay_proto::shared::ResponseType::Data, None, 1, &body);

        let error = write_response(&mut ours, response, Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TimedOut);
    }
}
