use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::{debug, info, warn};
use tunnel_relay_proto::{
    serialize::U8ReprEnum,
    shared::{peek_session_id, RequestType, ResponseRef, Role},
};

use crate::{
    config::LegConfig,
    registry::{Rejected, SessionRegistry},
    session::{Delivery, Session},
    utils::{shutdown_connection, write_response},
};

use super::{receive::receive_first_frame, relay::relay_loop, shutdown::ShutdownSignal};

/// The registry type used for connections of stream type `S`.
pub type Registry<S> = SessionRegistry<WriteHalf<S>>;

/// Handles a freshly accepted connection: reads its first frame, creates or joins a session
/// accordingly, and relays the connection's frames until it leaves the session.
pub async fn handle_connection<S>(stream: S, registry: Arc<Registry<S>>, config: LegConfig, mut shutdown: ShutdownSignal)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);

    let mut buf = vec![0u8; config.target_buffer_size];
    let (type_byte, role_byte, session_id) = match receive_first_frame(&mut reader, &mut buf, &mut shutdown).await {
        Some(frame) => (frame[0], frame[1], peek_session_id(frame).unwrap_or_default()),
        None => {
            debug!("Discarding connection, its first frame isn't a lone header");
            return;
        }
    };
    drop(buf);

    let role = Role::from_u8(role_byte);
    match RequestType::from_u8(type_byte) {
        Some(RequestType::MakeSession) => make_session(reader, writer, role, &registry, config, shutdown).await,
        Some(RequestType::JoinSession) => join_session(reader, writer, role, session_id, &registry, config, shutdown).await,
        request_type => {
            warn!("Bad first request {request_type:?} (type byte {type_byte}), closing connection");
            reject(writer, ResponseRef::bad_request(session_id), config).await;
        }
    }
}

/// Answers with `response` and closes the connection.
async fn reject<W: AsyncWrite + Unpin>(mut writer: W, response: ResponseRef<'_>, config: LegConfig) {
    if let Err(error) = write_response(&mut writer, response, config.write_timeout).await {
        debug!("Failed to send {:?} response: {error}", response.response_type);
    }

    if let Err(error) = shutdown_connection(&mut writer, config.write_timeout).await {
        debug!("Failed to shut down rejected connection: {error}");
    }
}

async fn make_session<S>(
    mut reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    role: Option<Role>,
    registry: &Registry<S>,
    config: LegConfig,
    mut shutdown: ShutdownSignal,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    if role != Some(Role::Host) {
        warn!("Refusing to make a session for a connection that isn't a host");
        reject(writer, ResponseRef::make_session_fail(), config).await;
        return;
    }

    let (session, closed) = match registry.create(writer) {
        Ok(created) => created,
        Err(Rejected { error, conn }) => {
            warn!("Refusing to make a session: {error}");
            reject(conn, ResponseRef::make_session_fail(), config).await;
            return;
        }
    };

    let session_id = session.id();
    info!(session_id, "Session created");

    if session.send_to(Role::Host, ResponseRef::make_session_success(session_id)).await != Delivery::Delivered {
        debug!(session_id, "Failed to tell the host its session was created");
    }

    relay_loop(&mut reader, &session, Role::Host, closed, config.host_buffer_size, &mut shutdown).await;
    finish(registry, &session).await;
}

async fn join_session<S>(
    mut reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    role: Option<Role>,
    session_id: u16,
    registry: &Registry<S>,
    config: LegConfig,
    mut shutdown: ShutdownSignal,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    if role != Some(Role::Target) {
        warn!(session_id, "Refusing to join a connection that isn't a target");
        reject(writer, ResponseRef::join_session_fail(session_id), config).await;
        return;
    }

    let (session, closed) = match registry.join(session_id, writer).await {
        Ok((session, delivery, closed)) => {
            if delivery != Delivery::Delivered {
                debug!(session_id, "Failed to tell the target it joined");
            }
            (session, closed)
        }
        Err(Rejected { error, conn }) => {
            warn!(session_id, "Refusing to join session: {error}");
            reject(conn, ResponseRef::join_session_fail(session_id), config).await;
            return;
        }
    };

    info!(session_id, "Target joined session");
    relay_loop(&mut reader, &session, Role::Target, closed, config.target_buffer_size, &mut shutdown).await;
    finish(registry, &session).await;
}

async fn finish<S>(registry: &Registry<S>, session: &Arc<Session<WriteHalf<S>>>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    if registry.cleanup(session).await {
        info!(session_id = session.id(), "Session closed");
    }
}
