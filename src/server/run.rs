use std::{
    fmt,
    io::{self, Error, ErrorKind},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use tokio::{
    io::WriteHalf,
    net::{TcpListener, TcpSocket, TcpStream},
    select,
    sync::{watch, OwnedSemaphorePermit, Semaphore},
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    config::{LegConfig, ServerConfig},
    registry::SessionRegistry,
};

use super::{connection::handle_connection, shutdown::ShutdownSignal};

/// How long to wait before accepting again after `accept` fails.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum StartError {
    Socket(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(SocketAddr, io::Error),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(error) => write!(f, "Failed to create socket: {error}"),
            Self::Bind(address, error) => write!(f, "Failed to bind socket to {address}: {error}"),
            Self::Listen(address, error) => write!(f, "Failed to listen at {address}: {error}"),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Socket(error) | Self::Bind(_, error) | Self::Listen(_, error) => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped,
}

struct Control {
    shutdown: watch::Sender<bool>,
    state: watch::Sender<RunState>,
}

impl Control {
    fn new() -> Self {
        Self {
            shutdown: watch::channel(false).0,
            state: watch::channel(RunState::Idle).0,
        }
    }

    /// Moves from idle to running, unless a stop was already requested.
    fn begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            let stop_requested = *self.shutdown.borrow();
            if *state == RunState::Idle && !stop_requested {
                *state = RunState::Running;
                true
            } else {
                false
            }
        })
    }

    fn finish(&self) {
        self.state.send_replace(RunState::Stopped);
    }
}

/// A way of stopping a [`RelayServer`] from outside the task running it.
#[derive(Clone)]
pub struct ServerHandle {
    control: Arc<Control>,
}

impl ServerHandle {
    /// Requests the server to stop and waits until it has. Every open connection is closed and every
    /// connection handler finished by the time this returns.
    ///
    /// Calling this more than once, or on a server that isn't running, is fine.
    pub async fn stop(&self) {
        if !self.control.shutdown.send_replace(true) {
            info!("Stopping server");
        }

        let mut state = self.control.state.subscribe();
        loop {
            let running = *state.borrow_and_update() == RunState::Running;
            if !running || state.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_stopping(&self) -> bool {
        *self.control.shutdown.borrow()
    }
}

/// The relay server: accepts connections and hands each to its own connection handler.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry<WriteHalf<TcpStream>>>,
    leg_config: LegConfig,
    max_clients: usize,
    control: Arc<Control>,
}

impl RelayServer {
    /// Creates the listening socket. Must be called from within a tokio runtime.
    pub fn bind(config: &ServerConfig) -> Result<Self, StartError> {
        let address = config.socket_addr();
        let max_clients = config.max_clients.get();
        info!("Starting server at {address}");
        info!("Max connections: {max_clients}");

        let socket = TcpSocket::new_v4().map_err(StartError::Socket)?;
        socket.set_reuseaddr(true).map_err(StartError::Socket)?;
        socket.bind(address).map_err(|error| StartError::Bind(address, error))?;
        let listener = socket.listen(max_clients as u32).map_err(|error| StartError::Listen(address, error))?;
        let local_addr = listener.local_addr().map_err(|error| StartError::Listen(address, error))?;
        info!("Listening at {local_addr}");

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(SessionRegistry::new(max_clients as usize, config.write_timeout)),
            leg_config: LegConfig::from_server_config(config),
            max_clients: max_clients as usize,
            control: Arc::new(Control::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<WriteHalf<TcpStream>>> {
        &self.registry
    }

    /// Accepts and serves connections until stopped through a [`ServerHandle`].
    pub async fn run(self) {
        let Self {
            listener,
            registry,
            leg_config,
            max_clients,
            control,
            ..
        } = self;

        if !control.begin() {
            info!("Server stopped before it started");
            control.finish();
            return;
        }

        let mut shutdown = ShutdownSignal::new(control.shutdown.subscribe());
        // A session has up to two connections, and a full registry must still be able to answer.
        let permits = Arc::new(Semaphore::new(max_clients * 2));
        let mut handlers = JoinSet::new();

        loop {
            let accepted = select! {
                biased;
                _ = shutdown.wait() => break,
                Some(result) = handlers.join_next() => {
                    log_handler_result(result);
                    continue;
                }
                accepted = accept_client(&listener, &permits) => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!("Failed to accept client: {error}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            debug!("Accepted client from {peer}");
            let registry = Arc::clone(&registry);
            let shutdown = shutdown.clone();
            let handler = async move {
                handle_connection(stream, registry, leg_config, shutdown).await;
                drop(permit);
            };

            handlers.spawn(handler.instrument(info_span!("client", %peer)));
        }

        drop(listener);
        info!("Waiting for {} connections to close", handlers.len());
        while let Some(result) = handlers.join_next().await {
            log_handler_result(result);
        }

        control.finish();
        info!("Server stopped");
    }
}

/// Waits for a free client slot, then for a client to connect.
async fn accept_client(listener: &TcpListener, permits: &Arc<Semaphore>) -> io::Result<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
    let permit = Arc::clone(permits)
        .acquire_owned()
        .await
        .map_err(|_| Error::new(ErrorKind::Other, "Client slots closed"))?;

    let (stream, peer) = listener.accept().await?;
    Ok((stream, peer, permit))
}

fn log_handler_result(result: Result<(), JoinError>) {
    if let Err(join_error) = result {
        match join_error.is_panic() {
            true => error!("Connection handler panicked: {join_error}"),
            false => debug!("Connection handler cancelled: {join_error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{Ipv4Addr, SocketAddr},
        num::NonZeroU16,
        sync::Arc,
        time::Duration,
    };

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt, WriteHalf},
        net::TcpStream,
        task::JoinHandle,
    };
    use tunnel_relay_proto::{
        client::{join_session, make_session, read_response, write_request, Establish},
        shared::{Request, ResponseRef, ResponseType, Role},
    };

    use super::{RelayServer, ServerHandle};
    use crate::{config::ServerConfig, registry::SessionRegistry, session::SessionStatus};

    struct TestServer {
        addr: SocketAddr,
        registry: Arc<SessionRegistry<WriteHalf<TcpStream>>>,
        handle: ServerHandle,
        task: JoinHandle<()>,
    }

    fn start() -> TestServer {
        start_with(8)
    }

    fn start_with(max_clients: u16) -> TestServer {
        let mut config = ServerConfig::new(Ipv4Addr::LOCALHOST, 0, NonZeroU16::new(max_clients).unwrap());
        config.write_timeout = Duration::from_secs(2);

        let server = RelayServer::bind(&config).unwrap();
        TestServer {
            addr: server.local_addr(),
            registry: Arc::clone(server.registry()),
            handle: server.handle(),
            task: tokio::spawn(server.run()),
        }
    }

    async fn eventually<F: FnMut() -> bool>(mut condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("Condition wasn't met in time");
    }

    async fn status(registry: &SessionRegistry<WriteHalf<TcpStream>>, session_id: u16) -> SessionStatus {
        registry.get(session_id).unwrap().status().await
    }

    async fn open_session(addr: SocketAddr) -> (TcpStream, u16) {
        let mut host = TcpStream::connect(addr).await.unwrap();
        let session_id = make_session(&mut host).await.unwrap().session_id().unwrap();
        (host, session_id)
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let server = start();

        let (mut host, session_id) = open_session(server.addr).await;
        assert!(session_id < 10000);
        assert!(server.registry.exists(session_id));
        assert_eq!(
            status(&server.registry, session_id).await,
            SessionStatus {
                host_connected: true,
                target_connected: false
            }
        );

        let mut target = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(join_session(&mut target, session_id).await.unwrap(), Establish::Accepted(session_id));
        assert_eq!(
            status(&server.registry, session_id).await,
            SessionStatus {
                host_connected: true,
                target_connected: true
            }
        );

        write_request(&mut host, &Request::data(Role::Host, session_id, b"ping")).await.unwrap();
        let data = read_response(&mut target).await.unwrap();
        assert_eq!(data.response_type, ResponseType::Data);
        assert_eq!(data.origin, Some(Role::Host));
        assert_eq!(data.body, b"ping");

        write_request(&mut target, &Request::raise_event(Role::Target, session_id, b"pong")).await.unwrap();
        let event = read_response(&mut host).await.unwrap();
        assert_eq!(event.as_response_ref(), ResponseRef::new(ResponseType::RaiseEvent, Some(Role::Target), session_id, b"pong"));

        drop(target);
        let closed = read_response(&mut host).await.unwrap();
        assert_eq!(closed.as_response_ref(), ResponseRef::session_closed_by(Role::Target, session_id));
        assert!(server.registry.exists(session_id));

        drop(host);
        let registry = Arc::clone(&server.registry);
        eventually(move || !registry.exists(session_id)).await;

        server.handle.stop().await;
        server.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_join_unknown_session() {
        let server = start();
        let (_host, session_id) = open_session(server.addr).await;
        let unknown = (session_id + 1) % 10000;

        let mut target = TcpStream::connect(server.addr).await.unwrap();
        match join_session(&mut target, unknown).await.unwrap() {
            Establish::Rejected(response) => assert_eq!(response.as_response_ref(), ResponseRef::join_session_fail(unknown)),
            other => panic!("Expected a rejection, got {other:?}"),
        }

        assert_eq!(server.registry.len(), 1);
        assert!(!server.registry.exists(unknown));
        assert!(!status(&server.registry, session_id).await.target_connected);

        server.handle.stop().await;
    }

    #[tokio::test]
    async fn test_size_mismatch() {
        let server = start();
        let (mut host, session_id) = open_session(server.addr).await;

        let mut frame = Request::data(Role::Host, session_id, b"12345").encode().unwrap();
        frame[7] = 2;
        host.write_all(&frame).await.unwrap();

        let answer = read_response(&mut host).await.unwrap();
        assert_eq!(answer.as_response_ref(), ResponseRef::bad_request(session_id));
        assert!(status(&server.registry, session_id).await.host_connected);

        // The leg keeps working after a bad request.
        let mut target = TcpStream::connect(server.addr).await.unwrap();
        join_session(&mut target, session_id).await.unwrap();
        write_request(&mut host, &Request::data(Role::Host, session_id, b"ok")).await.unwrap();
        assert_eq!(read_response(&mut target).await.unwrap().body, b"ok");

        server.handle.stop().await;
    }

    #[tokio::test]
    async fn test_body_shorter_than_declared() {
        let server = start();
        let (mut host, session_id) = open_session(server.addr).await;
        let mut target = TcpStream::connect(server.addr).await.unwrap();
        join_session(&mut target, session_id).await.unwrap();

        let mut frame = Request::data(Role::Host, session_id, b"abcd").encode().unwrap();
        frame[4..8].copy_from_slice(&10u32.to_be_bytes());
        host.write_all(&frame).await.unwrap();
        let answer = read_response(&mut host).await.unwrap();
        assert_eq!(answer.as_response_ref(), ResponseRef::bad_request(session_id));

        // Declaring more than the target's buffer holds is a bad request too, not a closed leg.
        let mut frame = Request::data(Role::Target, session_id, b"0123456789").encode().unwrap();
        frame[4..8].copy_from_slice(&5000u32.to_be_bytes());
        target.write_all(&frame).await.unwrap();
        let answer = read_response(&mut target).await.unwrap();
        assert_eq!(answer.as_response_ref(), ResponseRef::bad_request(session_id));

        assert_eq!(
            status(&server.registry, session_id).await,
            SessionStatus {
                host_connected: true,
                target_connected: true
            }
        );

        write_request(&mut host, &Request::data(Role::Host, session_id, b"ok")).await.unwrap();
        assert_eq!(read_response(&mut target).await.unwrap().body, b"ok");
        write_request(&mut target, &Request::data(Role::Target, session_id, b"ko")).await.unwrap();
        assert_eq!(read_response(&mut host).await.unwrap().body, b"ko");

        server.handle.stop().await;
    }

    #[tokio::test]
    async fn test_registry_full() {
        let server = start_with(1);
        let (_host, session_id) = open_session(server.addr).await;

        let mut second = TcpStream::connect(server.addr).await.unwrap();
        match make_session(&mut second).await.unwrap() {
            Establish::Rejected(response) => assert_eq!(response.as_response_ref(), ResponseRef::make_session_fail()),
            other => panic!("Expected a rejection, got {other:?}"),
        }

        // The full session can still be joined.
        let mut target = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(join_session(&mut target, session_id).await.unwrap(), Establish::Accepted(session_id));
        assert_eq!(server.registry.len(), 1);
        assert!(status(&server.registry, session_id).await.target_connected);

        server.handle.stop().await;
    }

    #[tokio::test]
    async fn test_data_dropped_without_target() {
        let server = start();
        let (mut host, session_id) = open_session(server.addr).await;

        write_request(&mut host, &Request::data(Role::Host, session_id, b"nobody")).await.unwrap();

        // Frames on a leg are handled in order, so once this is answered the data was dropped.
        write_request(&mut host, &Request::data(Role::Target, session_id, b"")).await.unwrap();
        assert_eq!(read_response(&mut host).await.unwrap().response_type, ResponseType::BadRequest);

        let mut target = TcpStream::connect(server.addr).await.unwrap();
        join_session(&mut target, session_id).await.unwrap();
        write_request(&mut host, &Request::data(Role::Host, session_id, b"somebody")).await.unwrap();
        assert_eq!(read_response(&mut target).await.unwrap().body, b"somebody");

        server.handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_connections() {
        let server = start();
        let (mut host, session_id) = open_session(server.addr).await;
        let mut target = TcpStream::connect(server.addr).await.unwrap();
        join_session(&mut target, session_id).await.unwrap();

        server.handle.stop().await;
        assert!(server.handle.is_stopping());
        server.task.await.unwrap();
        assert!(server.registry.is_empty());

        // Both clients see their stream end, possibly after a closed-session notification.
        let mut rest = Vec::new();
        host.read_to_end(&mut rest).await.unwrap();
        target.read_to_end(&mut rest).await.unwrap();

        assert!(TcpStream::connect(server.addr).await.is_err());
        server.handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let config = ServerConfig::new(Ipv4Addr::LOCALHOST, 0, NonZeroU16::new(1).unwrap());
        let server = RelayServer::bind(&config).unwrap();
        let handle = server.handle();

        handle.stop().await;
        server.run().await;
        handle.stop().await;
    }
}
