use std::io::{self, Error, ErrorKind};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    serialize::{read_u8_repr, ByteRead, U8ReprEnum},
    HEADER_SIZE,
};

use super::{body_size_of, Role};

/// The kind of a response frame, the first byte of its header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    MakeSessionSuccess = 0,
    MakeSessionFail = 1,
    JoinSessionSuccess = 2,
    JoinSessionFail = 3,
    SessionClosedByHost = 4,
    SessionClosedByTarget = 5,
    RaiseEvent = b'E',
    Data = b'D',
    BadRequest = b'B',
}

impl ResponseType {
    /// Gets the notification sent to the remaining leg when the leg with role `role` leaves.
    pub const fn closed_by(role: Role) -> Self {
        match role {
            Role::Host => Self::SessionClosedByHost,
            Role::Target => Self::SessionClosedByTarget,
        }
    }
}

impl U8ReprEnum for ResponseType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::MakeSessionSuccess),
            1 => Some(Self::MakeSessionFail),
            2 => Some(Self::JoinSessionSuccess),
            3 => Some(Self::JoinSessionFail),
            4 => Some(Self::SessionClosedByHost),
            5 => Some(Self::SessionClosedByTarget),
            b'E' => Some(Self::RaiseEvent),
            b'D' => Some(Self::Data),
            b'B' => Some(Self::BadRequest),
            _ => None,
        }
    }

    fn into_u8(self) -> u8 {
        self as u8
    }
}

/// The byte placed in a response's origin field when the server itself produced the response.
pub const SERVER_ORIGIN: u8 = 0;

fn origin_into_u8(origin: Option<Role>) -> u8 {
    origin.map_or(SERVER_ORIGIN, Role::into_u8)
}

/// A response frame, borrowing its body. This is what the server builds and sends.
///
/// The header is laid out like a request's, except the second byte is the _origin_: the role of
/// the leg whose frame is being relayed, or [`SERVER_ORIGIN`] for responses the server produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseRef<'a> {
    pub response_type: ResponseType,
    pub origin: Option<Role>,
    pub session_id: u16,
    pub body: &'a [u8],
}

impl<'a> ResponseRef<'a> {
    pub const fn new(response_type: ResponseType, origin: Option<Role>, session_id: u16, body: &'a [u8]) -> Self {
        Self {
            response_type,
            origin,
            session_id,
            body,
        }
    }

    const fn from_server(response_type: ResponseType, session_id: u16) -> ResponseRef<'static> {
        ResponseRef::new(response_type, None, session_id, &[])
    }

    pub const fn make_session_success(session_id: u16) -> ResponseRef<'static> {
        Self::from_server(ResponseType::MakeSessionSuccess, session_id)
    }

    pub const fn make_session_fail() -> ResponseRef<'static> {
        Self::from_server(ResponseType::MakeSessionFail, 0)
    }

    pub const fn join_session_success(session_id: u16) -> ResponseRef<'static> {
        Self::from_server(ResponseType::JoinSessionSuccess, session_id)
    }

    pub const fn join_session_fail(session_id: u16) -> ResponseRef<'static> {
        Self::from_server(ResponseType::JoinSessionFail, session_id)
    }

    /// The notification telling a leg that the leg with role `role` left the session.
    pub const fn session_closed_by(role: Role, session_id: u16) -> ResponseRef<'static> {
        Self::from_server(ResponseType::closed_by(role), session_id)
    }

    pub const fn bad_request(session_id: u16) -> ResponseRef<'static> {
        Self::from_server(ResponseType::BadRequest, session_id)
    }

    /// Encodes this response into a single buffer, header included.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let body_size = body_size_of(self.body)?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.body.len());
        buf.push(self.response_type.into_u8());
        buf.push(origin_into_u8(self.origin));
        buf.extend_from_slice(&self.session_id.to_be_bytes());
        buf.extend_from_slice(&body_size.to_be_bytes());
        buf.extend_from_slice(self.body);
        Ok(buf)
    }
}

/// The most body bytes [`Response::read`] reserves space for before they're received.
const MAX_PREALLOCATED_BODY: usize = 64 * 1024;

/// A response frame that owns its body. This is what clients read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub response_type: ResponseType,
    pub origin: Option<Role>,
    pub session_id: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn as_response_ref(&self) -> ResponseRef {
        ResponseRef::new(self.response_type, self.origin, self.session_id, &self.body)
    }
}

impl ByteRead for Response {
    async fn read<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let response_type = read_u8_repr::<ResponseType, R>(reader).await?;
        let origin = match u8::read(reader).await? {
            SERVER_ORIGIN => None,
            value => match Role::from_u8(value) {
                Some(role) => Some(role),
                None => return Err(Error::new(ErrorKind::InvalidData, format!("Invalid response origin byte: {value}"))),
            },
        };

        let session_id = u16::read(reader).await?;
        let body_size = u32::read(reader).await?;

        // The declared size can't be trusted until the bytes actually arrive.
        let mut body = Vec::with_capacity((body_size as usize).min(MAX_PREALLOCATED_BODY));
        (&mut *reader).take(body_size as u64).read_to_end(&mut body).await?;
        if body.len() != body_size as usize {
            return Err(Error::new(ErrorKind::UnexpectedEof, "Response body ended early"));
        }

        Ok(Self {
            response_type,
            origin,
            session_id,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use crate::{
        serialize::ByteRead,
        shared::{Response, ResponseRef, ResponseType, Role},
    };

    #[tokio::test]
    async fn test_read_relayed() {
        let encoded = ResponseRef::new(ResponseType::Data, Some(Role::Target), 9999, b"pong").encode().unwrap();
        assert_eq!(encoded[..8], [b'D', b'T', 0x27, 0x0f, 0, 0, 0, 4]);

        let response = Response::read(&mut &encoded[..]).await.unwrap();
        assert_eq!(response.response_type, ResponseType::Data);
        assert_eq!(response.origin, Some(Role::Target));
        assert_eq!(response.session_id, 9999);
        assert_eq!(response.body, b"pong");
    }

    #[tokio::test]
    async fn test_server_responses() {
        let encoded = ResponseRef::session_closed_by(Role::Host, 42).encode().unwrap();
        assert_eq!(encoded, [4, 0, 0, 42, 0, 0, 0, 0]);

        let encoded = ResponseRef::bad_request(7).encode().unwrap();
        let response = Response::read(&mut &encoded[..]).await.unwrap();
        assert_eq!(response.as_response_ref(), ResponseRef::bad_request(7));
        assert_eq!(response.origin, None);
    }

    #[tokio::test]
    async fn test_read_invalid() {
        let mut reader: &[u8] = &[b'Z', 0, 0, 0, 0, 0, 0, 0];
        let error = Response::read(&mut reader).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);

        let mut reader: &[u8] = &[b'D', b'X', 0, 0, 0, 0, 0, 0];
        let error = Response::read(&mut reader).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);

        let mut reader: &[u8] = &[b'D', b'H', 0, 1, 0, 0, 0, 10, 1, 2, 3];
        let error = Response::read(&mut reader).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_huge_declared_body() {
        let mut reader: &[u8] = &[b'D', b'H', 0, 1, 0xff, 0xff, 0xff, 0xff, 1, 2, 3];
        let error = Response::read(&mut reader).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnexpectedEof);
    }
}
