use crate::{
    channel::{mpsc_unbounded, Tx, UnboundedTx},
    error::SocketError,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    runtime::Handle,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Upper bound on bytes queued for write on a single connection. A full queue makes
/// [`TcpConnection::write`] return [`SocketError::NoSpace`]; higher layers decide what to do
/// (the gateway fan-out drops the slow consumer).
pub const MAX_PENDING_WRITE_BYTES: usize = 1 << 20;

/// The I/O reactor: one dedicated OS thread running a current-thread tokio runtime that owns
/// every socket in the process. No user code runs here - socket callbacks parse bytes and
/// marshal typed work onto an event loop.
pub struct Reactor {
    handle: Handle,
    thread_id: thread::ThreadId,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

impl Reactor {
    pub fn new() -> Result<Arc<Self>, SocketError> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("reactor".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        let _ = handle_tx.send(Err(error));
                        return;
                    }
                };

                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                info!("reactor started");

                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                info!("reactor stopped");
            })?;

        let thread_id = thread.thread().id();
        let handle = handle_rx
            .recv()
            .map_err(|_| SocketError::Runtime("reactor thread died during init".into()))??;

        Ok(Arc::new(Self {
            handle,
            thread_id,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// Handle onto the reactor runtime, for components that run their own socket tasks
    /// (eg/ venue WebSocket sessions).
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_reactor_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Open a TCP connection. Resolution and connection run on the reactor; `on_complete`
    /// fires on the reactor thread with the connected socket or the last candidate's error.
    ///
    /// Each resolved address candidate is given `timeout`; when all candidates are
    /// exhausted the last error wins.
    pub fn connect(
        self: &Arc<Self>,
        host: &str,
        port: u16,
        timeout: Duration,
        on_complete: impl FnOnce(Result<TcpConnection, SocketError>) + Send + 'static,
    ) {
        let host = host.to_string();
        let reactor = Arc::clone(self);

        self.handle.spawn(async move {
            let addrs = match tokio::net::lookup_host((host.as_str(), port)).await {
                Ok(addrs) => addrs.collect::<Vec<_>>(),
                Err(error) => {
                    on_complete(Err(SocketError::Io(error)));
                    return;
                }
            };

            if addrs.is_empty() {
                on_complete(Err(SocketError::Resolve(format!("{host}:{port}"))));
                return;
            }

            let mut last_error = SocketError::Resolve(format!("{host}:{port}"));
            for addr in addrs {
                match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(stream)) => {
                        debug!(%addr, "connected");
                        on_complete(Ok(TcpConnection::from_stream(stream, &reactor)));
                        return;
                    }
                    Ok(Err(error)) => {
                        debug!(%addr, %error, "connect candidate failed");
                        last_error = SocketError::Io(error);
                    }
                    Err(_) => {
                        debug!(%addr, "connect candidate timed out");
                        last_error = SocketError::ConnectTimeout(format!("{host}:{port}"));
                    }
                }
            }

            on_complete(Err(last_error));
        });
    }

    /// Bind a listen socket and deliver each accepted connection to `on_accept` on the
    /// reactor thread. The bind happens on the reactor but its result is awaited here, so
    /// address errors surface immediately. Must not be called from the reactor thread.
    pub fn listen(
        self: &Arc<Self>,
        addr: &str,
        port: u16,
        mut on_accept: impl FnMut(TcpConnection) + Send + 'static,
    ) -> Result<TcpListenerHandle, SocketError> {
        assert!(
            !self.is_reactor_thread(),
            "Reactor::listen must not be called from the reactor thread"
        );

        let bind_addr: SocketAddr = format!("{addr}:{port}")
            .parse()
            .map_err(|_| SocketError::Resolve(format!("{addr}:{port}")))?;

        let (bound_tx, bound_rx) = std::sync::mpsc::channel();
        let reactor = Arc::clone(self);
        let task = self.handle.spawn(async move {
            let bound = (|| {
                let socket = if bind_addr.is_ipv4() {
                    tokio::net::TcpSocket::new_v4()?
                } else {
                    tokio::net::TcpSocket::new_v6()?
                };
                socket.set_reuseaddr(true)?;
                socket.bind(bind_addr)?;
                socket.listen(1024)
            })();

            let listener = match bound {
                Ok(listener) => {
                    let _ = bound_tx.send(listener.local_addr().map_err(SocketError::Io));
                    listener
                }
                Err(error) => {
                    let _ = bound_tx.send(Err(SocketError::Io(error)));
                    return;
                }
            };

            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        on_accept(TcpConnection::from_stream(stream, &reactor));
                    }
                    Err(error) => {
                        warn!(%error, "accept failed");
                    }
                }
            }
        });

        let local_addr = bound_rx
            .recv()
            .map_err(|_| SocketError::Runtime("reactor died during listen".into()))??;

        Ok(TcpListenerHandle {
            local_addr,
            task: Mutex::new(Some(task)),
        })
    }

    /// Stop the reactor thread, cancelling every socket task it owns.
    pub fn sync_stop(&self) {
        if let Some(shutdown) = self.shutdown_tx.lock().take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.lock().take() {
            if !self.is_reactor_thread() {
                let _ = thread.join();
            }
        }
    }
}

/// Handle to a bound listen socket. Dropping or closing it stops accepting.
pub struct TcpListenerHandle {
    local_addr: SocketAddr,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TcpListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpListenerHandle")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl TcpListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for TcpListenerHandle {
    fn drop(&mut self) {
        self.close();
    }
}

struct ConnShared {
    peer: Option<SocketAddr>,
    closed: AtomicBool,
    pending_write: AtomicUsize,
    read_half: Mutex<Option<OwnedReadHalf>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    write_task: Mutex<Option<JoinHandle<()>>>,
}

/// A connected TCP socket owned by the reactor.
///
/// Reads are delivered as chunks to the callback given to [`start_read`](Self::start_read):
/// `Ok` with bytes for data, `Ok` with an empty chunk for EOF, `Err` for a read error.
/// Writes are queued into a bounded in-memory buffer drained by the reactor.
#[derive(Clone)]
pub struct TcpConnection {
    shared: Arc<ConnShared>,
    write_tx: UnboundedTx<Bytes, SocketError>,
    handle: Handle,
    max_pending_write: usize,
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer", &self.shared.peer)
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl TcpConnection {
    fn from_stream(stream: TcpStream, reactor: &Arc<Reactor>) -> Self {
        let _ = stream.set_nodelay(true);
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(ConnShared {
            peer,
            closed: AtomicBool::new(false),
            pending_write: AtomicUsize::new(0),
            read_half: Mutex::new(Some(read_half)),
            read_task: Mutex::new(None),
            write_task: Mutex::new(None),
        });

        let (write_tx, write_rx) = mpsc_unbounded::<Bytes, SocketError>();
        let write_task = reactor
            .handle()
            .spawn(write_main(Arc::clone(&shared), write_half, write_rx));
        *shared.write_task.lock() = Some(write_task);

        Self {
            shared,
            write_tx,
            handle: reactor.handle().clone(),
            max_pending_write: MAX_PENDING_WRITE_BYTES,
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Begin delivering read chunks to `on_read` on the reactor thread. May be called once.
    pub fn start_read(
        &self,
        mut on_read: impl FnMut(Result<Bytes, std::io::Error>) + Send + 'static,
    ) -> Result<(), SocketError> {
        let Some(mut read_half) = self.shared.read_half.lock().take() else {
            return Err(SocketError::NotConnected);
        };

        let shared = Arc::clone(&self.shared);
        let task = self.handle.spawn(async move {
            let mut buf = BytesMut::with_capacity(READ_CHUNK_BYTES);
            loop {
                match read_half.read_buf(&mut buf).await {
                    Ok(0) => {
                        shared.closed.store(true, Ordering::Release);
                        on_read(Ok(Bytes::new()));
                        break;
                    }
                    Ok(_) => {
                        on_read(Ok(buf.split().freeze()));
                        buf.reserve(READ_CHUNK_BYTES);
                    }
                    Err(error) => {
                        shared.closed.store(true, Ordering::Release);
                        on_read(Err(error));
                        break;
                    }
                }
            }
        });

        *self.shared.read_task.lock() = Some(task);
        Ok(())
    }

    /// Queue bytes for write. Returns [`SocketError::NoSpace`] if the outbound buffer is
    /// full, [`SocketError::Closed`] if the connection is gone.
    pub fn write(&self, data: &[u8]) -> Result<(), SocketError> {
        if self.is_closed() {
            return Err(SocketError::Closed);
        }

        let pending = self.shared.pending_write.load(Ordering::Acquire);
        if pending + data.len() > self.max_pending_write {
            return Err(SocketError::NoSpace);
        }

        self.shared
            .pending_write
            .fetch_add(data.len(), Ordering::AcqRel);
        self.write_tx.send(Bytes::copy_from_slice(data))
    }

    /// Close the connection, cancelling its reactor tasks. Queued but unwritten bytes are
    /// discarded. Idempotent; safe from any thread.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        if let Some(task) = self.shared.read_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.shared.write_task.lock().take() {
            task.abort();
        }
    }
}

async fn write_main(
    shared: Arc<ConnShared>,
    mut write_half: OwnedWriteHalf,
    mut write_rx: crate::channel::UnboundedRx<Bytes>,
) {
    while let Some(chunk) = write_rx.recv().await {
        let len = chunk.len();
        if let Err(error) = write_half.write_all(&chunk).await {
            debug!(%error, "socket write failed");
            shared.closed.store(true, Ordering::Release);
            break;
        }
        shared.pending_write.fetch_sub(len, Ordering::AcqRel);
    }
}
