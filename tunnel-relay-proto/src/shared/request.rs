use std::{
    fmt,
    io::{self, Error, ErrorKind},
};

use crate::{serialize::U8ReprEnum, HEADER_SIZE};

use super::{ResponseType, Role};

/// The kind of a request frame, the first byte of its header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    MakeSession = b'M',
    JoinSession = b'J',
    CloseSession = b'C',
    RaiseEvent = b'E',
    Data = b'D',
}

impl RequestType {
    /// Gets the response type under which a request of this type is relayed to the other leg of
    /// a session, or `None` if requests of this type are not relayed.
    pub const fn relayed_as(self) -> Option<ResponseType> {
        match self {
            Self::Data => Some(ResponseType::Data),
            Self::RaiseEvent => Some(ResponseType::RaiseEvent),
            _ => None,
        }
    }
}

impl U8ReprEnum for RequestType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'M' => Some(Self::MakeSession),
            b'J' => Some(Self::JoinSession),
            b'C' => Some(Self::CloseSession),
            b'E' => Some(Self::RaiseEvent),
            b'D' => Some(Self::Data),
            _ => None,
        }
    }

    fn into_u8(self) -> u8 {
        self as u8
    }
}

/// The header of a request, as it is laid out on the wire:
/// ```text
/// +------+------+------------+-----------+
/// | TYPE | ROLE | SESSION_ID | BODY_SIZE |
/// +------+------+------------+-----------+
/// |  1   |  1   |     2      |     4     |
/// +------+------+------------+-----------+
/// ```
/// `SESSION_ID` and `BODY_SIZE` are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub request_type: RequestType,
    pub role: Role,
    pub session_id: u16,
    pub body_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// Less than [`HEADER_SIZE`] bytes were available.
    TooShort,

    /// The type byte doesn't represent any [`RequestType`].
    UnknownRequestType(u8),

    /// The role byte doesn't represent any [`Role`].
    UnknownRole(u8),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "frame is shorter than a header"),
            Self::UnknownRequestType(value) => write!(f, "unknown request type byte {value}"),
            Self::UnknownRole(value) => write!(f, "unknown role byte {value}"),
        }
    }
}

impl RequestHeader {
    pub const fn new(request_type: RequestType, role: Role, session_id: u16, body_size: u32) -> Self {
        Self {
            request_type,
            role,
            session_id,
            body_size,
        }
    }

    /// Writes this header into the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than [`HEADER_SIZE`].
    pub fn write_to(&self, buf: &mut [u8]) -> usize {
        if buf.len() < HEADER_SIZE {
            panic!("The provided buffer is not large enough to write a RequestHeader");
        }

        buf[0] = self.request_type.into_u8();
        buf[1] = self.role.into_u8();
        buf[2..4].copy_from_slice(&self.session_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.body_size.to_be_bytes());
        HEADER_SIZE
    }

    /// Parses a header from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_SIZE {
            return Err(HeaderError::TooShort);
        }

        let request_type = RequestType::from_u8(buf[0]).ok_or(HeaderError::UnknownRequestType(buf[0]))?;
        let role = Role::from_u8(buf[1]).ok_or(HeaderError::UnknownRole(buf[1]))?;

        Ok(Self {
            request_type,
            role,
            session_id: peek_session_id(buf).unwrap_or_default(),
            body_size: peek_body_size(buf).unwrap_or_default(),
        })
    }
}

/// Reads the session ID field of a header without validating anything else, or `None` if `buf` is
/// shorter than a header.
pub fn peek_session_id(buf: &[u8]) -> Option<u16> {
    buf.get(..HEADER_SIZE).map(|header| u16::from_be_bytes([header[2], header[3]]))
}

/// Reads the body size field of a header without validating anything else, or `None` if `buf` is
/// shorter than a header.
pub fn peek_body_size(buf: &[u8]) -> Option<u32> {
    buf.get(..HEADER_SIZE)
        .map(|header| u32::from_be_bytes([header[4], header[5], header[6], header[7]]))
}

/// Gets the total amount of bytes (header included) the frame starting at `buf` says it has, or
/// `None` if `buf` is shorter than a header.
pub fn declared_frame_len(buf: &[u8]) -> Option<usize> {
    peek_body_size(buf).map(|body_size| HEADER_SIZE.saturating_add(body_size as usize))
}

/// Converts a body length into its header representation, failing if it doesn't fit.
pub(crate) fn body_size_of(body: &[u8]) -> io::Result<u32> {
    u32::try_from(body.len()).map_err(|_| Error::new(ErrorKind::InvalidInput, "Frame body is too large"))
}

/// A request frame, borrowing its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub request_type: RequestType,
    pub role: Role,
    pub session_id: u16,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    pub const fn new(request_type: RequestType, role: Role, session_id: u16, body: &'a [u8]) -> Self {
        Self {
            request_type,
            role,
            session_id,
            body,
        }
    }

    /// The request a host opens a session with.
    pub const fn make_session() -> Request<'static> {
        Request::new(RequestType::MakeSession, Role::Host, 0, &[])
    }

    /// The request a target joins the session `session_id` with.
    pub const fn join_session(session_id: u16) -> Request<'static> {
        Request::new(RequestType::JoinSession, Role::Target, session_id, &[])
    }

    /// The request a leg closes its side of a session with.
    pub const fn close_session(role: Role, session_id: u16) -> Request<'static> {
        Request::new(RequestType::CloseSession, role, session_id, &[])
    }

    pub const fn data(role: Role, session_id: u16, body: &'a [u8]) -> Self {
        Self::new(RequestType::Data, role, session_id, body)
    }

    pub const fn raise_event(role: Role, session_id: u16, body: &'a [u8]) -> Self {
        Self::new(RequestType::RaiseEvent, role, session_id, body)
    }

    /// Parses a whole frame. The body is everything after the header, regardless of what the
    /// header declares; checking that is up to [`validate`](super::validate).
    pub fn parse(frame: &'a [u8]) -> Result<Self, HeaderError> {
        let header = RequestHeader::parse(frame)?;
        Ok(Self {
            request_type: header.request_type,
            role: header.role,
            session_id: header.session_id,
            body: &frame[HEADER_SIZE..],
        })
    }

    /// Encodes this request into a single buffer, header included.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let header = RequestHeader::new(self.request_type, self.role, self.session_id, body_size_of(self.body)?);

        let mut buf = vec![0u8; HEADER_SIZE + self.body.len()];
        let index = header.write_to(&mut buf);
        buf[index..].copy_from_slice(self.body);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        shared::{declared_frame_len, HeaderError, Request, RequestHeader, RequestType, Role},
        HEADER_SIZE,
    };

    #[test]
    fn test_encode_layout() {
        let encoded = Request::data(Role::Host, 0x0102, b"ping").encode().unwrap();
        assert_eq!(encoded, [b'D', b'H', 0x01, 0x02, 0, 0, 0, 4, b'p', b'i', b'n', b'g']);
        assert_eq!(declared_frame_len(&encoded), Some(HEADER_SIZE + 4));

        let parsed = Request::parse(&encoded).unwrap();
        assert_eq!(parsed, Request::data(Role::Host, 0x0102, b"ping"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(RequestHeader::parse(&[b'M', b'H', 0, 0]), Err(HeaderError::TooShort));
        assert_eq!(
            RequestHeader::parse(&[b'X', b'H', 0, 0, 0, 0, 0, 0]),
            Err(HeaderError::UnknownRequestType(b'X'))
        );
        assert_eq!(
            RequestHeader::parse(&[b'M', b'Q', 0, 0, 0, 0, 0, 0]),
            Err(HeaderError::UnknownRole(b'Q'))
        );
    }

    #[test]
    fn test_relayed_as() {
        assert!(RequestType::Data.relayed_as().is_some());
        assert!(RequestType::RaiseEvent.relayed_as().is_some());
        assert!(RequestType::CloseSession.relayed_as().is_none());
        assert!(RequestType::MakeSession.relayed_as().is_none());
        assert!(RequestType::JoinSession.relayed_as().is_none());
    }
}
