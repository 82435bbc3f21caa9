use std::{
    fmt,
    net::Ipv4Addr,
    num::{IntErrorKind, NonZeroU16},
    time::Duration,
};

use crate::config::MIN_BUFFER_SIZE;

#[derive(Debug, PartialEq, Eq)]
pub enum AddressErrorType {
    UnexpectedEnd(String),
    InvalidValue(String, String),
}

impl fmt::Display for AddressErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd(arg) => write!(f, "Expected IPv4 address after {arg}"),
            Self::InvalidValue(arg, arg2) => write!(f, "Invalid IPv4 address after {arg}: {arg2}"),
        }
    }
}

pub(super) fn parse_address_arg(arg: String, maybe_arg2: Option<String>) -> Result<Ipv4Addr, AddressErrorType> {
    let arg2 = match maybe_arg2 {
        Some(arg2) => arg2,
        None => return Err(AddressErrorType::UnexpectedEnd(arg)),
    };

    arg2.parse::<Ipv4Addr>().map_err(|_| AddressErrorType::InvalidValue(arg, arg2))
}

#[derive(Debug, PartialEq, Eq)]
pub enum PortErrorType {
    UnexpectedEnd(String),
    TooLarge(String, String),
    InvalidValue(String, String),
}

impl fmt::Display for PortErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd(arg) => write!(f, "Expected port number after {arg}"),
            Self::TooLarge(arg, arg2) => write!(f, "Port number must be at most 16 bits after {arg}: {arg2}"),
            Self::InvalidValue(arg, arg2) => write!(f, "Invalid port number after {arg}: {arg2}"),
        }
    }
}

pub(super) fn parse_port_number_arg(arg: String, maybe_arg2: Option<String>) -> Result<u16, PortErrorType> {
    let arg2 = match maybe_arg2 {
        Some(arg2) => arg2,
        None => return Err(PortErrorType::UnexpectedEnd(arg)),
    };

    arg2.parse::<u16>().map_err(|parse_int_error| match parse_int_error.kind() {
        IntErrorKind::PosOverflow => PortErrorType::TooLarge(arg, arg2),
        _ => PortErrorType::InvalidValue(arg, arg2),
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionCountErrorType {
    UnexpectedEnd(String),
    MustBeGreaterThanZero(String, String),
    TooLarge(String, String),
    InvalidValue(String, String),
}

impl fmt::Display for ConnectionCountErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd(arg) => write!(f, "Expected integer after {arg}"),
            Self::MustBeGreaterThanZero(arg, arg2) => write!(f, "Connection count must be greater than 0 after {arg}: {arg2}"),
            Self::TooLarge(arg, arg2) => write!(f, "Connection count must be at most 16 bits after {arg}: {arg2}"),
            Self::InvalidValue(arg, arg2) => write!(f, "Invalid connection count after {arg}: {arg2}"),
        }
    }
}

pub(super) fn parse_connection_count_arg(arg: String, maybe_arg2: Option<String>) -> Result<NonZeroU16, ConnectionCountErrorType> {
    let arg2 = match maybe_arg2 {
        Some(arg2) => arg2,
        None => return Err(ConnectionCountErrorType::UnexpectedEnd(arg)),
    };

    arg2.parse::<NonZeroU16>().map_err(|parse_int_error| match parse_int_error.kind() {
        IntErrorKind::Zero | IntErrorKind::NegOverflow => ConnectionCountErrorType::MustBeGreaterThanZero(arg, arg2),
        IntErrorKind::PosOverflow => ConnectionCountErrorType::TooLarge(arg, arg2),
        _ => ConnectionCountErrorType::InvalidValue(arg, arg2),
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum BufferSizeErrorType {
    UnexpectedEnd(String),
    TooSmall(String, String),
    InvalidValue(String, String),
}

impl fmt::Display for BufferSizeErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd(arg) => write!(f, "Expected buffer size after {arg}"),
            Self::TooSmall(arg, arg2) => write!(f, "Buffer size must be at least {MIN_BUFFER_SIZE} after {arg}: {arg2}"),
            Self::InvalidValue(arg, arg2) => write!(f, "Invalid buffer size after {arg}: {arg2}"),
        }
    }
}

pub(super) fn parse_buffer_size_arg(arg: String, maybe_arg2: Option<String>) -> Result<usize, BufferSizeErrorType> {
    let arg2 = match maybe_arg2 {
        Some(arg2) => arg2,
        None => return Err(BufferSizeErrorType::UnexpectedEnd(arg)),
    };

    match arg2.parse::<usize>() {
        Ok(size) if size >= MIN_BUFFER_SIZE => Ok(size),
        Ok(_) => Err(BufferSizeErrorType::TooSmall(arg, arg2)),
        Err(_) => Err(BufferSizeErrorType::InvalidValue(arg, arg2)),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TimeoutErrorType {
    UnexpectedEnd(String),
    MustBeGreaterThanZero(String, String),
    InvalidValue(String, String),
}

impl fmt::Display for TimeoutErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd(arg) => write!(f, "Expected milliseconds after {arg}"),
            Self::MustBeGreaterThanZero(arg, arg2) => write!(f, "Timeout must be greater than 0 after {arg}: {arg2}"),
            Self::InvalidValue(arg, arg2) => write!(f, "Invalid timeout after {arg}: {arg2}"),
        }
    }
}

pub(super) fn parse_timeout_arg(arg: String, maybe_arg2: Option<String>) -> Result<Duration, TimeoutErrorType> {
    let arg2 = match maybe_arg2 {
        Some(arg2) => arg2,
        None => return Err(TimeoutErrorType::UnexpectedEnd(arg)),
    };

    match arg2.parse::<u64>() {
        Ok(0) => Err(TimeoutErrorType::MustBeGreaterThanZero(arg, arg2)),
        Ok(millis) => Ok(Duration::from_millis(millis)),
        Err(_) => Err(TimeoutErrorType::InvalidValue(arg, arg2)),
    }
}
