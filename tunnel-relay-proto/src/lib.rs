//! This crate describes the protocol spoken between tunnel-relay peers and the relay server.
//!
//! The protocol runs over a plain TCP connection. Every message, in either direction, is a frame:
//! an 8-byte header followed by an opaque body whose length is declared in the header.
//!
//! # Establishing a session
//! The first frame a peer sends on a fresh connection decides what that connection is for. This
//! frame must consist of exactly the header, no body. A host sends
//! [`MakeSession`](shared::RequestType::MakeSession) with the [`Host`](shared::Role::Host) role,
//! and the server answers with [`MakeSessionSuccess`](shared::ResponseType::MakeSessionSuccess)
//! carrying the ID of the new session. The host then hands that ID to a target out of band, and
//! the target sends [`JoinSession`](shared::RequestType::JoinSession) with the
//! [`Target`](shared::Role::Target) role and that session ID, to which the server answers with
//! [`JoinSessionSuccess`](shared::ResponseType::JoinSessionSuccess) or
//! [`JoinSessionFail`](shared::ResponseType::JoinSessionFail).
//!
//! # Inside a session
//! Once a connection is part of a session (we call each side of a session a _leg_), every frame
//! the peer sends must carry that leg's role and session ID. [`Data`](shared::RequestType::Data)
//! and [`RaiseEvent`](shared::RequestType::RaiseEvent) frames are relayed to the other leg without
//! interpretation, and [`CloseSession`](shared::RequestType::CloseSession) closes the sender's leg.
//! When a leg goes away, the other one (if still connected) is told so with
//! [`SessionClosedByHost`](shared::ResponseType::SessionClosedByHost) or
//! [`SessionClosedByTarget`](shared::ResponseType::SessionClosedByTarget). A malformed frame is
//! answered with [`BadRequest`](shared::ResponseType::BadRequest) and otherwise ignored.
//!
//! # Framing
//! The server treats one receive as one frame (see [`shared::validate`]), so a peer must write
//! each frame in a single write. [`client::write_request`] does exactly that.

pub mod client;
pub mod serialize;
pub mod shared;

/// The size (in bytes) of every request and response header.
pub const HEADER_SIZE: usize = 8;
