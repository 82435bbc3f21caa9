use std::fmt;

use crate::serialize::U8ReprEnum;

/// The role a peer claims in a session. Every request carries its sender's role.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The peer that originates a session.
    Host = b'H',

    /// The peer that joins an existing session by ID.
    Target = b'T',
}

impl Role {
    /// Gets the role of the other leg of a session.
    pub const fn peer(self) -> Self {
        match self {
            Self::Host => Self::Target,
            Self::Target => Self::Host,
        }
    }
}

impl U8ReprEnum for Role {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'H' => Some(Self::Host),
            b'T' => Some(Self::Target),
            _ => None,
        }
    }

    fn into_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Target => write!(f, "target"),
        }
    }
}
