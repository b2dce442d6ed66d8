//! Event channel transport.
//!
//! Framing on the wire: u32 big-endian length followed by a JSON
//! [`Frame`] envelope.

use anyhow::{Context, Result};
use rover_proto::Frame;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;
pub const QUEUE_DEPTH: usize = 64;

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Channel>> + Send>>;

/// Opens event channels. Each call is one dial attempt.
pub trait Connector {
    fn connect(&self) -> ConnectFuture;
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct AbortOnDrop<T = ()>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    pub fn new(handle: JoinHandle<T>) -> Self {
        Self(handle)
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A live bidirectional event channel. Dropping it tears down its I/O tasks.
pub struct Channel {
    pub inbound: mpsc::Receiver<Frame>,
    pub outbound: mpsc::Sender<Frame>,
    _tasks: Vec<AbortOnDrop>,
}

impl Channel {
    pub fn new(inbound: mpsc::Receiver<Frame>, outbound: mpsc::Sender<Frame>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self {
            inbound,
            outbound,
            _tasks: tasks.into_iter().map(AbortOnDrop::new).collect(),
        }
    }

    /// In-process channel; the returned [`Peer`] plays the server side.
    pub fn pair() -> (Channel, Peer) {
        let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);
        let (out_tx, out_rx) = mpsc::channel(QUEUE_DEPTH);
        (Channel::new(in_rx, out_tx, Vec::new()), Peer { tx: in_tx, rx: out_rx })
    }
}

pub struct Peer {
    pub tx: mpsc::Sender<Frame>,
    pub rx: mpsc::Receiver<Frame>,
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self { addr: addr.into(), timeout }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> ConnectFuture {
        let addr = self.addr.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
                .await
                .with_context(|| format!("connect {} timed out after {:?}", addr, timeout))?
                .with_context(|| format!("connect {}", addr))?;
            tcp.set_nodelay(true).ok();

            let (rd, wr) = tcp.into_split();
            let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);
            let (out_tx, out_rx) = mpsc::channel(QUEUE_DEPTH);
            let reader = tokio::spawn(read_loop(rd, in_tx));
            let writer = tokio::spawn(write_loop(wr, out_rx));
            debug!("transport: connected to {}", addr);
            Ok(Channel::new(in_rx, out_tx, vec![reader, writer]))
        })
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut rd: R, tx: mpsc::Sender<Frame>) {
    loop {
        let body = match read_frame(&mut rd).await {
            Ok(Some(b)) => b,
            Ok(None) => {
                debug!("transport: peer closed");
                return;
            }
            Err(e) => {
                warn!("transport: read failed: {:#}", e);
                return;
            }
        };
        match Frame::from_bytes(&body) {
            Ok(frame) => {
                if tx.send(frame).await.is_err() {
                    return;
                }
            }
            // one bad frame does not kill the link
            Err(e) => warn!("transport: dropping malformed frame: {}", e),
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(mut wr: W, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut wr, &frame).await {
            warn!("transport: write failed: {:#}", e);
            return;
        }
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(wr: &mut W, frame: &Frame) -> Result<()> {
    let body = frame.to_bytes()?;
    anyhow::ensure!(body.len() <= MAX_FRAME_BYTES, "frame too large: {} bytes", body.len());
    let len = (body.len() as u32).to_be_bytes();
    wr.write_all(&len).await?;
    wr.write_all(&body).await?;
    wr.flush().await?;
    Ok(())
}

/// Reads one frame body. `Ok(None)` on a clean close between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(rd: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match rd.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len) as usize;
    anyhow::ensure!(len <= MAX_FRAME_BYTES, "frame too large: {} bytes", len);
    let mut body = vec![0u8; len];
    rd.read_exact(&mut body).await.context("truncated frame")?;
    Ok(Some(body))
}
