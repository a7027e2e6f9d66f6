//! IQ streaming server
//!
//! Every accepted client gets its own thread and its own ring reader, created
//! at accept time so a client only sees samples from then on. A client that
//! cannot keep up blocks only itself on `send`; if it falls a full buffer
//! behind it loses data, never the producer or other clients.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::NetworkError;
use crate::iq::{RingReader, SharedRingBuffer};

use super::create_listener;

/// Accept backlog of the stream listener
const STREAM_BACKLOG: i32 = 16;

/// One streaming client draining the ring into its sink
pub struct ClientConnection<W: Write> {
    id: usize,
    sink: W,
    reader: RingReader,
    scratch: Vec<u8>,
    running: bool,
    bytes_sent: u64,
}

impl<W: Write> ClientConnection<W> {
    pub fn new(id: usize, sink: W, reader: RingReader) -> Self {
        Self {
            id,
            sink,
            reader,
            scratch: Vec::new(),
            running: true,
            bytes_sent: 0,
        }
    }

    /// Stream until a send fails, then hand back the byte count.
    ///
    /// A peer close shows up as a failed or zero-length write and ends only
    /// this client; the sink is dropped (closing a socket) on return.
    pub fn run(mut self) -> u64 {
        while self.running {
            self.reader.wait();

            while self.running && self.reader.drain_into(&mut self.scratch) > 0 {
                if let Err(e) = self.send() {
                    tracing::debug!("Client {}: {}", self.id, e);
                    self.running = false;
                }
            }
        }
        self.bytes_sent
    }

    fn send(&mut self) -> Result<(), NetworkError> {
        self.sink
            .write_all(&self.scratch)
            .map_err(NetworkError::SendFailed)?;
        self.bytes_sent += self.scratch.len() as u64;
        Ok(())
    }
}

/// TCP listener fanning the ring out to any number of clients
pub struct StreamServer {
    listener: TcpListener,
    ring: SharedRingBuffer,
    next_id: AtomicUsize,
}

impl StreamServer {
    pub fn bind(addr: SocketAddr, ring: SharedRingBuffer) -> Result<Self, NetworkError> {
        let listener = create_listener(addr, STREAM_BACKLOG)?;
        tracing::info!("Stream socket listening on {}", listener.local_addr().unwrap_or(addr));
        Ok(Self {
            listener,
            ring,
            next_id: AtomicUsize::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::AcceptFailed)
    }

    /// Accept clients forever.
    ///
    /// There is no cap on concurrent clients; each costs one thread. A failed
    /// accept or thread spawn loses only that one connection.
    pub fn run(&self) {
        loop {
            self.accept_next(spawn_client_thread);
        }
    }

    /// Accept one connection and hand its client loop to `spawn`
    fn accept_next<S>(&self, spawn: S) -> bool
    where
        S: FnOnce(String, ClientTask) -> io::Result<()>,
    {
        match self.listener.accept() {
            Ok((stream, peer)) => self.start_client(stream, peer, spawn),
            Err(e) => {
                tracing::warn!("Accept on stream socket failed: {}", e);
                false
            }
        }
    }

    fn start_client<S>(&self, stream: TcpStream, peer: SocketAddr, spawn: S) -> bool
    where
        S: FnOnce(String, ClientTask) -> io::Result<()>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Reader position is taken here, at accept time
        let reader = RingReader::new(Arc::clone(&self.ring));
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Client {}: TCP_NODELAY not set: {}", id, e);
        }

        tracing::info!("Client {} connected from {}", id, peer);

        let task: ClientTask = Box::new(move || {
            let sent = ClientConnection::new(id, stream, reader).run();
            tracing::info!("Client {} ({}) disconnected after {} bytes", id, peer, sent);
        });

        // On failure the task, and with it the socket, is already dropped
        match spawn(format!("iq-client-{id}"), task) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Client {} ({}) dropped: {}", id, peer, NetworkError::SpawnFailed(e));
                false
            }
        }
    }
}

/// Client loop waiting for its thread
type ClientTask = Box<dyn FnOnce() + Send + 'static>;

fn spawn_client_thread(name: String, task: ClientTask) -> io::Result<()> {
    thread::Builder::new().name(name).spawn(task).map(|_| ())
}
