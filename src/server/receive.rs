//! Turning receives on a leg's connection into frames.
//!
//! Each read is taken as one frame, exactly as it arrived. A frame whose header declares a body
//! size other than what the read returned is a bad request, never waited on.

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    select,
};
use tunnel_relay_proto::{
    shared::{check_receive_len, validate_request, FrameError, Request, Role, TransportError},
    HEADER_SIZE,
};

use super::shutdown::ShutdownSignal;

/// Does a single read into `buf`, giving up when shutdown is requested. A failed read counts as
/// zero bytes received.
async fn receive<R>(reader: &mut R, buf: &mut [u8], shutdown: &mut ShutdownSignal) -> usize
where
    R: AsyncRead + Unpin + ?Sized,
{
    select! {
        biased;
        _ = shutdown.wait() => 0,
        result = reader.read(buf) => result.unwrap_or(0),
    }
}

/// Receives the first frame of a connection, which must be exactly one header. Returns `None` if
/// the receive returned anything else.
pub async fn receive_first_frame<'a, R>(reader: &mut R, buf: &'a mut [u8], shutdown: &mut ShutdownSignal) -> Option<&'a [u8]>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let received = receive(reader, buf, shutdown).await;
    match received == HEADER_SIZE {
        true => Some(&buf[..HEADER_SIZE]),
        false => None,
    }
}

/// Receives one frame into `buf`, returning its length.
pub async fn receive_frame<R>(reader: &mut R, buf: &mut [u8], shutdown: &mut ShutdownSignal) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let received = receive(reader, buf, shutdown).await;
    check_receive_len(received, buf.len())?;
    Ok(received)
}

/// Receives one frame on the leg with role `role` of the session `session_id` and validates it.
pub async fn receive_request<'a, R>(
    reader: &mut R,
    buf: &'a mut [u8],
    role: Role,
    session_id: u16,
    shutdown: &mut ShutdownSignal,
) -> Result<Request<'a>, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = receive_frame(reader, buf, shutdown).await?;
    Ok(validate_request(&buf[..len], role, session_id)?)
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, sync::watch};
    use tunnel_relay_proto::{
        shared::{BadRequestReason, FrameError, Request, Role, TransportError},
        HEADER_SIZE,
    };

    use super::{receive_first_frame, receive_frame, receive_request};
    use crate::server::shutdown::ShutdownSignal;

    fn signal() -> (watch::Sender<bool>, ShutdownSignal) {
        let (sender, receiver) = watch::channel(false);
        (sender, ShutdownSignal::new(receiver))
    }

    #[tokio::test]
    async fn test_first_frame() {
        let (_sender, mut shutdown) = signal();
        let mut buf = [0u8; 100];

        let encoded = Request::join_session(12).encode().unwrap();
        let mut reader = &encoded[..];
        let frame = receive_first_frame(&mut reader, &mut buf, &mut shutdown).await.unwrap();
        assert_eq!(frame, &encoded[..]);

        let encoded = Request::data(Role::Host, 1, b"x").encode().unwrap();
        let mut reader = &encoded[..];
        assert!(receive_first_frame(&mut reader, &mut buf, &mut shutdown).await.is_none());
    }

    #[tokio::test]
    async fn test_short_body_not_waited_on() {
        let (_sender, mut shutdown) = signal();
        let (mut client, mut server) = tokio::io::duplex(1024);

        let mut encoded = Request::data(Role::Host, 4, b"ping").encode().unwrap();
        encoded[4..8].copy_from_slice(&10u32.to_be_bytes());
        client.write_all(&encoded).await.unwrap();

        let mut buf = [0u8; 100];
        let error = receive_request(&mut server, &mut buf, Role::Host, 4, &mut shutdown).await.unwrap_err();
        assert_eq!(
            error,
            FrameError::BadRequest(BadRequestReason::SizeMismatch {
                declared: HEADER_SIZE + 10,
                received: HEADER_SIZE + 4
            })
        );

        // The next frame is received on its own, not taken as the rest of the previous one.
        client.write_all(&Request::data(Role::Host, 4, b"pong").encode().unwrap()).await.unwrap();
        let request = receive_request(&mut server, &mut buf, Role::Host, 4, &mut shutdown).await.unwrap();
        assert_eq!(request.body, b"pong");
    }

    #[tokio::test]
    async fn test_declared_size_beyond_buffer() {
        let (_sender, mut shutdown) = signal();
        let mut buf = [0u8; 100];

        let mut encoded = Request::data(Role::Target, 9, b"0123456789").encode().unwrap();
        encoded[4..8].copy_from_slice(&5000u32.to_be_bytes());
        let mut reader = &encoded[..];
        let error = receive_request(&mut reader, &mut buf, Role::Target, 9, &mut shutdown).await.unwrap_err();
        assert!(matches!(error, FrameError::BadRequest(BadRequestReason::SizeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_transport_errors() {
        let (_sender, mut shutdown) = signal();
        let mut buf = [0u8; 16];

        let mut reader: &[u8] = &[];
        assert_eq!(receive_frame(&mut reader, &mut buf, &mut shutdown).await, Err(TransportError::Closed));

        let mut reader: &[u8] = &[b'D', b'H', 0, 0];
        assert_eq!(receive_frame(&mut reader, &mut buf, &mut shutdown).await, Err(TransportError::TooShort(4)));

        let encoded = Request::data(Role::Host, 0, &[7u8; 8]).encode().unwrap();
        let mut reader = &encoded[..];
        assert_eq!(receive_frame(&mut reader, &mut buf, &mut shutdown).await, Err(TransportError::Truncated));

        let mut reader = &encoded[..HEADER_SIZE];
        assert_eq!(receive_frame(&mut reader, &mut buf, &mut shutdown).await, Ok(HEADER_SIZE));
    }

    #[tokio::test]
    async fn test_bad_request() {
        let (_sender, mut shutdown) = signal();
        let mut buf = [0u8; 100];

        let encoded = Request::data(Role::Host, 3, b"abc").encode().unwrap();
        let mut reader = &encoded[..];
        let error = receive_request(&mut reader, &mut buf, Role::Target, 3, &mut shutdown).await.unwrap_err();
        assert!(matches!(error, FrameError::BadRequest(BadRequestReason::WrongRole { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts() {
        let (sender, mut shutdown) = signal();
        let (_client, mut server) = tokio::io::duplex(64);
        sender.send_replace(true);

        let mut buf = [0u8; 100];
        assert_eq!(receive_frame(&mut server, &mut buf, &mut shutdown).await, Err(TransportError::Closed));
    }
}
