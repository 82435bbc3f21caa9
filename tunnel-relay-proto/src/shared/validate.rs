//! Rules for deciding whether the bytes of one receive form a well-formed request.
//!
//! The server frames by receive: whatever a single read on a leg's connection returns is taken as
//! one frame. Two kinds of failure are distinguished:
//! - A [`TransportError`] means the connection can't be trusted to carry frames anymore (it was
//!   closed, or a frame didn't fit the leg's buffer). The leg is closed.
//! - A [`BadRequestReason`] means a frame arrived but isn't valid for the leg it arrived
//!   on. The sender is told so and the leg carries on.

use std::fmt;

use crate::{serialize::U8ReprEnum, HEADER_SIZE};

use super::{declared_frame_len, Request, RequestType, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The receive returned zero bytes or failed.
    Closed,

    /// The receive filled the whole buffer, so the frame was likely cut short.
    Truncated,

    /// The receive returned fewer bytes than a header.
    TooShort(usize),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Truncated => write!(f, "frame filled the whole receive buffer"),
            Self::TooShort(len) => write!(f, "received {len} bytes, less than a header"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadRequestReason {
    /// The type byte doesn't represent any [`RequestType`].
    UnknownRequestType(u8),

    /// The role byte isn't the role of the leg the frame arrived on.
    WrongRole { expected: Role, found: u8 },

    /// The session ID isn't the one of the session the leg belongs to.
    WrongSession { expected: u16, found: u16 },

    /// The header's body size plus the header size isn't the amount of bytes received.
    SizeMismatch { declared: usize, received: usize },
}

impl fmt::Display for BadRequestReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRequestType(value) => write!(f, "unknown request type byte {value}"),
            Self::WrongRole { expected, found } => write!(f, "expected role {expected}, found role byte {found}"),
            Self::WrongSession { expected, found } => write!(f, "expected session {expected}, found session {found}"),
            Self::SizeMismatch { declared, received } => write!(f, "frame declares {declared} bytes but {received} were received"),
        }
    }
}

/// Either way a receive can fail to produce a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Transport(TransportError),
    BadRequest(BadRequestReason),
}

impl From<TransportError> for FrameError {
    fn from(value: TransportError) -> Self {
        FrameError::Transport(value)
    }
}

impl From<BadRequestReason> for FrameError {
    fn from(value: BadRequestReason) -> Self {
        FrameError::BadRequest(value)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(error) => write!(f, "transport error: {error}"),
            Self::BadRequest(reason) => write!(f, "bad request: {reason}"),
        }
    }
}

/// Checks the length returned by a receive into a buffer of `capacity` bytes.
pub fn check_receive_len(received: usize, capacity: usize) -> Result<(), TransportError> {
    if received == 0 {
        Err(TransportError::Closed)
    } else if received >= capacity {
        Err(TransportError::Truncated)
    } else if received < HEADER_SIZE {
        Err(TransportError::TooShort(received))
    } else {
        Ok(())
    }
}

/// Validates a complete frame received on the leg with role `expected_role` of the session
/// `session_id`, returning the request it holds.
pub fn validate_request(frame: &[u8], expected_role: Role, session_id: u16) -> Result<Request<'_>, BadRequestReason> {
    let declared = match declared_frame_len(frame) {
        Some(declared) => declared,
        None => {
            return Err(BadRequestReason::SizeMismatch {
                declared: HEADER_SIZE,
                received: frame.len(),
            })
        }
    };

    if Role::from_u8(frame[1]) != Some(expected_role) {
        return Err(BadRequestReason::WrongRole {
            expected: expected_role,
            found: frame[1],
        });
    }

    let found_session = u16::from_be_bytes([frame[2], frame[3]]);
    if found_session != session_id {
        return Err(BadRequestReason::WrongSession {
            expected: session_id,
            found: found_session,
        });
    }

    if declared != frame.len() {
        return Err(BadRequestReason::SizeMismatch {
            declared,
            received: frame.len(),
        });
    }

    let request_type = RequestType::from_u8(frame[0]).ok_or(BadRequestReason::UnknownRequestType(frame[0]))?;

    Ok(Request::new(request_type, expected_role, session_id, &frame[HEADER_SIZE..]))
}
