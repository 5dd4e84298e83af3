//! RPC transport
//!
//! Newline-delimited JSON over TCP. Each line is one request envelope (see
//! `flipdot_driver::service`), answered by one response line. Clients may
//! keep a connection open for as long as they like: every connection has its
//! own reader thread, and only complete requests are handed to the bounded
//! worker pool. Once every worker is busy, requests queue for a free one.

use anyhow::{Context, Result};
use flipdot_driver::{Service, SignController};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often blocked accept/read calls look at the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long `serve` waits for open connections after a stop
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle that asks a running server to stop
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decrements the active connection count however the reader exits
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Server<C: SignController + ?Sized + 'static> {
    listener: TcpListener,
    service: Arc<Service<C>>,
    pool: Arc<rayon::ThreadPool>,
    shutdown: ShutdownHandle,
    active: Arc<AtomicUsize>,
}

impl<C: SignController + ?Sized + 'static> Server<C> {
    /// Bind the listener and build the worker pool
    pub fn bind(
        addr: impl ToSocketAddrs,
        service: Arc<Service<C>>,
        max_workers: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).context("Failed to bind RPC listener")?;
        listener
            .set_nonblocking(true)
            .context("Failed to configure RPC listener")?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("rpc-worker-{}", i))
            .build()
            .context("Failed to build RPC worker pool")?;

        Ok(Self {
            listener,
            service,
            pool: Arc::new(pool),
            shutdown: ShutdownHandle::default(),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until stopped, then wait for open ones to finish
    pub fn serve(&self) -> Result<()> {
        while !self.shutdown.is_stopped() {
            match self.listener.accept() {
                Ok((stream, peer)) => self.spawn_reader(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    log::warn!("Failed to accept connection: {}", e);
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        log::info!("RPC server stopping");
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.active.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                log::warn!(
                    "{} connection(s) still open after {:?}",
                    self.active.load(Ordering::SeqCst),
                    DRAIN_TIMEOUT
                );
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn spawn_reader(&self, stream: TcpStream, peer: SocketAddr) {
        log::debug!("Accepted connection from {}", peer);
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let service = Arc::clone(&self.service);
        let pool = Arc::clone(&self.pool);
        let shutdown = self.shutdown.clone();

        let spawned = thread::Builder::new()
            .name(format!("rpc-conn-{}", peer))
            .spawn(move || {
                let _guard = guard;
                if let Err(e) = handle_connection(stream, &service, &pool, &shutdown) {
                    log::warn!("Connection from {} ended with error: {}", peer, e);
                }
                log::debug!("Connection from {} closed", peer);
            });
        // On failure the closure, and with it the stream and guard, is dropped
        if let Err(e) = spawned {
            log::warn!("Failed to start reader for {}: {}", peer, e);
        }
    }
}

fn handle_connection<C: SignController + ?Sized>(
    stream: TcpStream,
    service: &Service<C>,
    pool: &rayon::ThreadPool,
    shutdown: &ShutdownHandle,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        // Raw bytes survive a timed-out read; decoding waits for the newline
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                if line.last() != Some(&b'\n') {
                    continue;
                }
                if !line.iter().all(u8::is_ascii_whitespace) {
                    let response = pool.install(|| service.handle_json(&line));
                    writer.write_all(response.as_bytes())?;
                    writer.write_all(b"\n")?;
                    writer.flush()?;
                }
                line.clear();
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                if shutdown.is_stopped() {
                    return Ok(());
                }
            }
            Err(e) => return Err(e),
        }
    }
}
