use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
};
use tracing::{debug, info, warn};
use tunnel_relay_proto::shared::{FrameError, RequestType, ResponseRef, Role};

use crate::session::{Delivery, Departure, LegClosed, Session};

use super::{receive::receive_request, shutdown::ShutdownSignal};

/// Relays frames received from one leg of a session to the other, until the leg leaves.
///
/// Bad requests are answered on the same leg and otherwise ignored. Data and events are forwarded
/// to the peer leg if it's connected, or dropped otherwise. A close request, a transport error or
/// a shutdown all end the loop and take the leg out of the session. So does `closed` firing, which
/// happens when the session drops the leg after failing to write to it.
pub async fn relay_loop<R, W>(
    reader: &mut R,
    session: &Session<W>,
    role: Role,
    mut closed: LegClosed,
    buffer_size: usize,
    shutdown: &mut ShutdownSignal,
) where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let session_id = session.id();
    let mut buf = vec![0u8; buffer_size];

    loop {
        let received = select! {
            biased;
            _ = &mut closed => {
                info!(session_id, "The {role} leg was dropped from the session");
                break;
            }
            received = receive_request(reader, &mut buf, role, session_id, shutdown) => received,
        };

        let request = match received {
            Ok(request) => request,
            Err(FrameError::Transport(error)) => {
                match shutdown.is_set() {
                    true => debug!(session_id, "Closing {role} leg for shutdown"),
                    false => info!(session_id, "Closing {role} leg: {error}"),
                }
                break;
            }
            Err(FrameError::BadRequest(reason)) => {
                warn!(session_id, "Bad request from {role}: {reason}");
                session.send_to(role, ResponseRef::bad_request(session_id)).await;
                continue;
            }
        };

        if request.request_type == RequestType::CloseSession {
            info!(session_id, "The {role} asked to close the session");
            break;
        }

        let response_type = match request.request_type.relayed_as() {
            Some(response_type) => response_type,
            None => {
                warn!(session_id, "Bad request from {role}: unexpected {:?} request", request.request_type);
                session.send_to(role, ResponseRef::bad_request(session_id)).await;
                continue;
            }
        };

        let response = ResponseRef::new(response_type, Some(role), session_id, request.body);
        match session.relay(role, response).await {
            Delivery::Delivered => debug!(session_id, "Relayed {} bytes from {role}", request.body.len()),
            Delivery::Absent => debug!(session_id, "Dropped {} bytes from {role}, no {} connected", request.body.len(), role.peer()),
            Delivery::Failed => warn!(session_id, "Failed to relay {} bytes from {role}", request.body.len()),
        }
    }

    match session.leave(role).await {
        Departure::PeerNotified => debug!(session_id, "Told the {} that the {role} left", role.peer()),
        Departure::PeerUnreachable => debug!(session_id, "Couldn't tell the {} that the {role} left", role.peer()),
        Departure::Alone | Departure::AlreadyGone => {}
    }
}
