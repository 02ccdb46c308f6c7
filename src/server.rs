use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use threadpool::ThreadPool;
use tracing::{debug, info, warn};

use crate::{connection::Connection, serve, App};

/// A thread pooled HTTP/1.x server.
///
/// Every accepted connection is served on a pool thread until the client
/// hangs up, stays idle for longer than the idle timeout, or the server is
/// shut down through its [`ShutdownHandle`].
pub struct Server {
    listener: TcpListener,
    thread_pool: ThreadPool,
    shutdown: Arc<AtomicBool>,
    idle_timeout: Duration,
    drain_timeout: Duration,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        Default::default()
    }

    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Server> {
        Self::builder().bind(addr)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            flag: self.shutdown.clone(),
            wake_addr: wake_addr(self.local_addr()?),
        })
    }

    /// Serves connections until shutdown is requested, then waits up to the
    /// drain timeout for in flight connections to finish.
    pub fn serve<Handle>(self, app: Handle) -> io::Result<()>
    where
        Handle: App,
        Handle: Send + Clone + 'static,
    {
        for conn in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let conn = match conn {
                Ok(conn) => Connection::from(conn),
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };

            if let Err(err) = conn.set_read_timeout(Some(self.idle_timeout)) {
                warn!(error = %err, "failed to set read timeout");
            }

            let app = app.clone();
            let shutdown = self.shutdown.clone();
            self.thread_pool.execute(move || {
                let peer = conn.peer_addr();
                if let Err(err) = serve(conn, &app, &shutdown) {
                    debug!(?peer, error = %err, "connection ended with an error");
                }
            });
        }

        drop(self.listener);
        drain(self.thread_pool, self.drain_timeout);
        Ok(())
    }
}

fn drain(thread_pool: ThreadPool, timeout: Duration) {
    let active = thread_pool.active_count();
    if active > 0 {
        info!(active, "waiting for in flight connections");
    }

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        thread_pool.join();
        done_tx.send(()).ok();
    });

    match done_rx.recv_timeout(timeout) {
        Ok(()) => info!("server shutdown"),
        Err(_) => warn!(?timeout, "gave up waiting for connections to finish"),
    }
}

/// Wildcard listeners can't be connected to, so wake them up through loopback.
fn wake_addr(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), local.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv6Addr::LOCALHOST.into(), local.port())
        }
        _ => local,
    }
}

/// Stops a running [`Server`] from another thread.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }

        // Unblock the accept loop
        if let Err(err) = TcpStream::connect_timeout(&self.wake_addr, Duration::from_secs(1)) {
            debug!(error = %err, "failed to wake up the listener");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct ServerBuilder {
    max_threads: usize,
    idle_timeout: Duration,
    drain_timeout: Duration,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            max_threads: 512,
            idle_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(20),
        }
    }
}

impl ServerBuilder {
    pub fn max_threads(self, max_threads: usize) -> Self {
        Self {
            max_threads,
            ..self
        }
    }

    pub fn idle_timeout(self, idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            ..self
        }
    }

    pub fn drain_timeout(self, drain_timeout: Duration) -> Self {
        Self {
            drain_timeout,
            ..self
        }
    }

    pub fn bind<A: ToSocketAddrs>(self, addr: A) -> io::Result<Server> {
        let listener = TcpListener::bind(addr)?;
        Ok(self.from_listener(listener))
    }

    pub fn from_listener(self, listener: TcpListener) -> Server {
        Server {
            listener,
            thread_pool: ThreadPool::new(self.max_threads.max(1)),
            shutdown: Arc::new(AtomicBool::new(false)),
            idle_timeout: self.idle_timeout,
            drain_timeout: self.drain_timeout,
        }
    }
}
