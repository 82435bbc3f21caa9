//! Defines the [`ByteRead`] and [`ByteWrite`] traits and implements them for the primitive types
//! the protocol's headers are made of: [`u8`], [`u16`] and [`u32`], all big-endian.
//!
//! These traits are used on the client side of the protocol, where frames are read from a stream
//! piece by piece. The server never reads with them, as it frames by receive (see
//! [`validate`](crate::shared::validate)).

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

pub mod primitives;
pub mod u8_repr_enum;

pub use u8_repr_enum::*;

/// Serializes a type into bytes, writing it to an [`AsyncWrite`] asynchronously.
#[allow(async_fn_in_trait)]
pub trait ByteWrite {
    /// Serializes this instance into bytes, writing those bytes into a writer.
    ///
    /// When an error occurs, there's no guarantee on how many bytes were written.
    async fn write<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> io::Result<()>;
}

/// Deserializes a type from raw bytes, reading it from an [`AsyncRead`] asynchronously.
#[allow(async_fn_in_trait)]
pub trait ByteRead: Sized {
    /// Deserializes bytes into an instance of this type by reading bytes from a reader.
    ///
    /// When an error occurs, there's no guarantee on how many bytes were read.
    async fn read<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Self>;
}
