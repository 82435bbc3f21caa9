//! Helpers for the peer side of the protocol: writing requests and reading responses, plus the
//! two session-establishing exchanges.
//!
//! Since the server takes each receive as one frame, a request must reach the socket in a single
//! write. [`write_request`] (and the [`ByteWrite`] impl of [`Request`]) encode the whole frame into
//! one buffer before writing it.

use std::io::{self, Error, ErrorKind};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::{
    serialize::{ByteRead, ByteWrite},
    shared::{Request, Response, ResponseType},
};

impl<'a> ByteWrite for Request<'a> {
    async fn write<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let buf = self.encode()?;
        writer.write_all(&buf).await?;
        writer.flush().await
    }
}

/// Writes a request as a single frame.
pub async fn write_request<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, request: &Request<'_>) -> io::Result<()> {
    request.write(writer).await
}

/// Reads the next response.
pub async fn read_response<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Response> {
    Response::read(reader).await
}

/// The result of trying to establish a session. `Rejected` holds whatever the server answered
/// instead of the expected success response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Establish {
    Accepted(u16),
    Rejected(Response),
}

impl Establish {
    pub fn session_id(&self) -> Option<u16> {
        match self {
            Self::Accepted(session_id) => Some(*session_id),
            Self::Rejected(_) => None,
        }
    }
}

async fn establish<S>(stream: &mut S, request: Request<'_>, success: ResponseType) -> io::Result<Establish>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    write_request(stream, &request).await?;

    let response = match read_response(stream).await {
        Ok(response) => response,
        Err(error) if error.kind() == ErrorKind::UnexpectedEof => {
            return Err(Error::new(ErrorKind::ConnectionAborted, "The server closed the connection without answering"))
        }
        Err(error) => return Err(error),
    };

    match response.response_type == success {
        true => Ok(Establish::Accepted(response.session_id)),
        false => Ok(Establish::Rejected(response)),
    }
}

/// Asks the server to open a new session, with us as the host.
pub async fn make_session<S: AsyncRead + AsyncWrite + Unpin + ?Sized>(stream: &mut S) -> io::Result<Establish> {
    establish(stream, Request::make_session(), ResponseType::MakeSessionSuccess).await
}

/// Asks the server to join us, as the target, to the session `session_id`.
pub async fn join_session<S: AsyncRead + AsyncWrite + Unpin + ?Sized>(stream: &mut S, session_id: u16) -> io::Result<Establish> {
    establish(stream, Request::join_session(session_id), ResponseType::JoinSessionSuccess).await
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use crate::{
        client::{make_session, Establish},
        serialize::ByteWrite,
        shared::{Request, ResponseRef, Role},
        HEADER_SIZE,
    };

    #[tokio::test]
    async fn test_single_write() {
        let (mut client, mut server) = tokio::io::duplex(64);
        Request::data(Role::Host, 3, b"hello").write(&mut client).await.unwrap();

        let mut buf = [0u8; 64];
        let received = server.read(&mut buf).await.unwrap();
        assert_eq!(received, HEADER_SIZE + 5);
    }

    #[tokio::test]
    async fn test_make_session() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let server_task = tokio::spawn(async move {
            let mut buf = [0u8; HEADER_SIZE];
            server.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf.to_vec(), Request::make_session().encode().unwrap());
            let response = ResponseRef::make_session_success(77).encode().unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut server, &response).await.unwrap();
        });

        assert_eq!(make_session(&mut client).await.unwrap(), Establish::Accepted(77));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_make_session_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let server_task = tokio::spawn(async move {
            let mut buf = [0u8; HEADER_SIZE];
            server.read_exact(&mut buf).await.unwrap();
            let response = ResponseRef::make_session_fail().encode().unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut server, &response).await.unwrap();
        });

        let result = make_session(&mut client).await.unwrap();
        assert!(matches!(result, Establish::Rejected(_)));
        assert_eq!(result.session_id(), None);
        server_task.await.unwrap();
    }
}
