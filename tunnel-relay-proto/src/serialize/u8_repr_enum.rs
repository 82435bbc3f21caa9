//! Provides the [`U8ReprEnum`] trait, which is made to be implemented by enums that travel on the
//! wire as a single byte, such as request types, response types and roles.

use std::{
    any::type_name,
    io::{self, Error, ErrorKind},
};

use tokio::io::AsyncRead;

use super::ByteRead;

/// Allows a type to be converted into or parsed from an [`u8`] representation.
pub trait U8ReprEnum: Sized + Copy {
    /// Parses an `u8` into the enum variant it represents. If the `u8` represents a variant in
    /// this enum, then `Some` is returned with said variant. Otherwise, `None` is returned.
    fn from_u8(value: u8) -> Option<Self>;

    /// Converts this enum into its `u8` representation.
    fn into_u8(self) -> u8;
}

/// Reads a single byte and parses it as a `T`, failing with [`ErrorKind::InvalidData`] if the
/// byte doesn't represent any variant.
pub async fn read_u8_repr<T: U8ReprEnum, R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<T> {
    let value = u8::read(reader).await?;
    T::from_u8(value).ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Invalid {} byte: {value}", type_name::<T>())))
}
