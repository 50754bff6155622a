//! Async WebSocket session
//!
//! A [`WebSocket`] drives one connection over any duplex byte transport.
//! Construction splits the transport and spawns:
//! - a reader that decodes frames, answers pings and assembles messages
//! - a writer that owns the write half; every outbound frame goes through it
//! - a heartbeat, when `ping_interval` is set
//!
//! The writer drains three queues with priority: control frames (pongs,
//! close echoes, aborts), then heartbeat pings, then consumer traffic.
//! All tasks share one cancellation token; once the session reaches
//! [`State::Closed`] the token fires and both transport halves are dropped.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::error::{CloseReason, Error, ErrorKind, Result};
use crate::frame::{FrameCodec, OpCode};
use crate::heartbeat::{Activity, Heartbeat, Outstanding};
use crate::protocol::{Event, Inbound, Message, Outbound, Role};
use crate::{Config, MAX_CONTROL_PAYLOAD, RECV_BUFFER_SIZE};

const DATA_QUEUE: usize = 32;
const CONTROL_QUEUE: usize = 16;
const PING_QUEUE: usize = 1;
const INCOMING_QUEUE: usize = 32;

/// Upper bound on the best-effort Close sent when a session fails
const ABORT_CLOSE_DEADLINE: Duration = Duration::from_secs(1);

/// Session lifecycle state
///
/// `Open → Closing → Closed`, except that a transport failure goes from
/// `Open` straight to `Closed`. No state is ever left once `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Messages flow in both directions
    Open,
    /// A Close frame has been sent or received
    Closing,
    /// Terminal
    Closed,
}

type Ack = oneshot::Sender<Result<()>>;

enum Command {
    Message(Message, Ack),
    Ping(Bytes, Option<Ack>),
    Pong(Bytes),
    Close {
        reason: Option<CloseReason>,
        ack: Option<Ack>,
    },
}

/// State visible to the handle and every task
struct Shared {
    state: watch::Sender<State>,
    close_reason: OnceLock<CloseReason>,
    close_sent: AtomicBool,
    error: Mutex<Option<Error>>,
    activity: Arc<Activity>,
    outstanding: Arc<Outstanding>,
    cancel: CancellationToken,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(State::Open);
        Self {
            state,
            close_reason: OnceLock::new(),
            close_sent: AtomicBool::new(false),
            error: Mutex::new(None),
            activity: Arc::new(Activity::default()),
            outstanding: Arc::new(Outstanding::default()),
            cancel: CancellationToken::new(),
        }
    }

    #[inline]
    fn state(&self) -> State {
        *self.state.borrow()
    }

    fn transition(&self, to: State) {
        self.state.send_if_modified(|state| {
            if *state == State::Closed || *state == to {
                return false;
            }
            debug!("session {:?} -> {:?}", *state, to);
            *state = to;
            true
        });
    }

    /// First caller wins; later reasons are ignored
    fn record_reason(&self, reason: CloseReason) {
        if self.close_reason.set(reason).is_ok() {
            trace!("close reason recorded");
        }
    }

    /// Returns true if no Close frame has been queued yet
    fn claim_close(&self) -> bool {
        !self.close_sent.swap(true, Ordering::AcqRel)
    }

    /// Keep the first fatal error for the consumer
    fn store_error(&self, err: Error) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_error(&self) -> Option<Error> {
        self.error.lock().take()
    }

    /// Enter `Closed` and stop every task
    fn finish(&self) {
        self.transition(State::Closed);
        self.cancel.cancel();
    }

    /// Force `Closed` if the peer has not finished the handshake in time
    fn arm_close_deadline(self: &Arc<Self>, wait: Duration) {
        let shared = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => {}
                _ = sleep(wait) => {
                    debug!("no close from peer within {:?}", wait);
                    shared.finish();
                }
            }
        });
    }

    /// The transport broke; no Close frame can be written
    fn fail_transport(&self, err: Error) {
        warn!("transport failed: {}", err);
        self.record_reason(err.close_reason());
        self.store_error(err);
        self.finish();
    }
}

/// What the reader and heartbeat need to act on the session
#[derive(Clone)]
struct Link {
    shared: Arc<Shared>,
    control: mpsc::Sender<Command>,
    close_timeout: Duration,
}

impl Link {
    /// Queue a control command unless the session is shutting down
    async fn queue(&self, command: Command) -> bool {
        tokio::select! {
            res = self.control.send(command) => res.is_ok(),
            _ = self.shared.cancel.cancelled() => false,
        }
    }

    /// Fail the session with `err`
    ///
    /// Records the reason, writes a best-effort Close bounded by a short
    /// deadline (skipped if the transport itself failed), then closes.
    async fn abort(&self, err: Error) {
        let shared = &self.shared;
        if shared.state() == State::Closed {
            return;
        }
        if err.kind() == ErrorKind::TransportFailure {
            shared.fail_transport(err);
            return;
        }

        warn!("session failed: {}", err);
        let reason = err.close_reason();
        shared.record_reason(reason.clone());
        shared.store_error(err);

        if shared.claim_close() {
            shared.transition(State::Closing);
            let (ack, done) = oneshot::channel();
            let close = Command::Close {
                reason: Some(reason),
                ack: Some(ack),
            };
            let deadline = ABORT_CLOSE_DEADLINE.min(self.close_timeout);
            let _ = timeout(deadline, async {
                if self.queue(close).await {
                    let _ = done.await;
                }
            })
            .await;
        }
        shared.finish();
    }

    /// The peer sent Close
    async fn on_peer_close(&self, reason: Option<CloseReason>) {
        let shared = &self.shared;
        match &reason {
            Some(r) => debug!("peer closed: {}", r),
            None => debug!("peer closed without status"),
        }
        shared.record_reason(reason.clone().unwrap_or_else(CloseReason::no_status));

        if shared.claim_close() {
            shared.transition(State::Closing);
            // Codes such as 1005 may not appear on the wire; echo empty instead
            let echoed = reason.filter(|r| CloseReason::is_valid_code(r.code));
            let (ack, done) = oneshot::channel();
            let echo = Command::Close {
                reason: echoed,
                ack: Some(ack),
            };
            let _ = timeout(self.close_timeout, async {
                if self.queue(echo).await {
                    let _ = done.await;
                }
            })
            .await;
        }
        shared.finish();
    }

    /// The transport reached EOF
    async fn on_eof(&self) {
        if self.shared.state() == State::Closing {
            debug!("transport closed during close handshake");
            self.shared.finish();
        } else {
            let eof = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "transport closed without a close frame",
            );
            self.abort(Error::Io(eof)).await;
        }
    }
}

/// An open WebSocket session
///
/// Received messages are read through [`recv`](WebSocket::recv) or the
/// [`Stream`] implementation. The stream ends once the session is closed;
/// if the session failed, the error is yielded once just before the end.
///
/// Dropping the handle cancels the session without a close handshake.
pub struct WebSocket {
    shared: Arc<Shared>,
    data: mpsc::Sender<Command>,
    incoming: mpsc::Receiver<Result<Message>>,
    role: Role,
    close_timeout: Duration,
}

impl WebSocket {
    /// Start a session over an upgraded transport
    ///
    /// Must be called from within a tokio runtime; the session's tasks are
    /// spawned onto it.
    pub fn new<S>(transport: S, config: Config) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;

        let protocol = config.protocol();
        let options = protocol.decode_options(config.max_frame_size);
        let (inbound, outbound) = protocol.split();
        let (read_half, write_half) = tokio::io::split(transport);

        let shared = Arc::new(Shared::new());
        let (data_tx, data_rx) = mpsc::channel(DATA_QUEUE);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        let (ping_tx, ping_rx) = mpsc::channel(PING_QUEUE);
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_QUEUE);

        let link = Link {
            shared: shared.clone(),
            control: control_tx,
            close_timeout: config.close_timeout,
        };

        match config.ping_interval {
            Some(period) => {
                let heartbeat = Heartbeat::new(
                    period,
                    config.timeout,
                    shared.activity.clone(),
                    shared.outstanding.clone(),
                    ping_tx,
                    shared.cancel.clone(),
                );
                let link = link.clone();
                tokio::spawn(async move {
                    if let Err(err) = heartbeat.run().await {
                        link.abort(err).await;
                    }
                });
            }
            None => drop(ping_tx),
        }

        let frames = FramedRead::with_capacity(read_half, FrameCodec::new(options), RECV_BUFFER_SIZE);
        let reader = Reader {
            frames,
            inbound,
            link,
            incoming: incoming_tx,
        };
        tokio::spawn(reader.run());

        let writer = Writer {
            sink: write_half,
            outbound,
            shared: shared.clone(),
            close_timeout: config.close_timeout,
        };
        tokio::spawn(writer.run(control_rx, ping_rx, data_rx));

        debug!("session opened as {:?}", config.role);

        Ok(Self {
            shared,
            data: data_tx,
            incoming: incoming_rx,
            role: config.role,
            close_timeout: config.close_timeout,
        })
    }

    /// Endpoint role
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// Check if the session is closed
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// The first Close sent or received, once there is one
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason.get().cloned()
    }

    /// Wait until the session is closed and return its close reason
    pub async fn closed(&self) -> Option<CloseReason> {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|s| *s == State::Closed).await;
        self.close_reason()
    }

    /// Receive the next message
    ///
    /// Returns `None` when the session is closed.
    pub async fn recv(&mut self) -> Option<Result<Message>> {
        match self.incoming.recv().await {
            Some(item) => Some(item),
            None => self.shared.take_error().map(Err),
        }
    }

    /// Queue a command for the writer and wait for it to be written
    ///
    /// A session that closes first drops the ack, which surfaces as
    /// [`Error::ConnectionClosed`].
    async fn submit(&self, command: Command, done: oneshot::Receiver<Result<()>>) -> Result<()> {
        tokio::select! {
            res = self.data.send(command) => res.map_err(|_| Error::ConnectionClosed)?,
            _ = self.shared.cancel.cancelled() => return Err(Error::ConnectionClosed),
        }
        done.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Send a message
    ///
    /// Completes once the frame has been written to the transport.
    pub async fn send(&self, msg: Message) -> Result<()> {
        if self.state() != State::Open {
            return Err(Error::ConnectionClosed);
        }
        let (ack, done) = oneshot::channel();
        self.submit(Command::Message(msg, ack), done).await
    }

    /// Send a text message
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::text(text)).await
    }

    /// Send a binary message
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(Message::binary(data)).await
    }

    /// Send a ping
    ///
    /// The resulting pong is consumed by the session, not surfaced.
    pub async fn send_ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::Protocol("control frame too large"));
        }
        if self.state() != State::Open {
            return Err(Error::ConnectionClosed);
        }
        let (ack, done) = oneshot::channel();
        self.submit(Command::Ping(payload, Some(ack)), done).await
    }

    /// Start the closing handshake
    ///
    /// Queued messages are written first. Completes once the Close frame
    /// is written; see [`closed`](WebSocket::closed) to wait for the end.
    /// The session is forced to `Closed` after `close_timeout`, even if the
    /// peer never answers or stops reading.
    pub async fn send_close(&self, code: u16, reason: &str) -> Result<()> {
        if !CloseReason::is_valid_code(code) {
            return Err(Error::InvalidCloseCode(code));
        }
        if reason.len() > MAX_CONTROL_PAYLOAD - 2 {
            return Err(Error::Protocol("close reason too long"));
        }
        if self.state() != State::Open || !self.shared.claim_close() {
            return Err(Error::ConnectionClosed);
        }

        let reason = CloseReason::new(code, reason);
        debug!("closing: {}", reason);
        self.shared.record_reason(reason.clone());
        self.shared.transition(State::Closing);
        self.shared.arm_close_deadline(self.close_timeout);

        let (ack, done) = oneshot::channel();
        let close = Command::Close {
            reason: Some(reason),
            ack: Some(ack),
        };
        self.submit(close, done).await
    }

    /// Close normally (1000) and wait for the session to end
    pub async fn close(&self) -> Result<()> {
        match self.send_close(CloseReason::NORMAL, "").await {
            Ok(()) | Err(Error::ConnectionClosed) => {}
            Err(err) => return Err(err),
        }
        self.closed().await;
        Ok(())
    }
}

impl Stream for WebSocket {
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.incoming.poll_recv(cx) {
            Poll::Ready(None) => Poll::Ready(this.shared.take_error().map(Err)),
            other => other,
        }
    }
}

impl Drop for WebSocket {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

struct Reader<R> {
    frames: FramedRead<R, FrameCodec>,
    inbound: Inbound,
    link: Link,
    incoming: mpsc::Sender<Result<Message>>,
}

impl<R> Reader<R>
where
    R: AsyncRead + Unpin,
{
    async fn run(mut self) {
        let cancel = self.link.shared.cancel.clone();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.frames.next() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => {
                    self.link.abort(err).await;
                    break;
                }
                None => {
                    self.link.on_eof().await;
                    break;
                }
            };

            if frame.opcode() != OpCode::Pong {
                self.link.shared.activity.bump();
            }

            let event = match self.inbound.handle_frame(frame) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(err) => {
                    self.link.abort(err).await;
                    break;
                }
            };

            match event {
                Event::Message(msg) => {
                    let delivered = tokio::select! {
                        res = self.incoming.send(Ok(msg)) => res.is_ok(),
                        _ = cancel.cancelled() => false,
                    };
                    if !delivered {
                        break;
                    }
                }
                Event::Ping(payload) => {
                    if self.link.shared.state() == State::Open {
                        trace!("answering ping");
                        self.link.queue(Command::Pong(payload)).await;
                    }
                }
                Event::Pong(payload) => {
                    if !self.link.shared.outstanding.pong(&payload) {
                        trace!("unsolicited pong");
                    }
                }
                Event::Close(reason) => {
                    self.link.on_peer_close(reason).await;
                    break;
                }
            }
        }

        trace!("reader stopped");
    }
}

struct Writer<W> {
    sink: W,
    outbound: Outbound,
    shared: Arc<Shared>,
    close_timeout: Duration,
}

impl<W> Writer<W>
where
    W: AsyncWrite + Unpin,
{
    async fn run(
        mut self,
        mut control: mpsc::Receiver<Command>,
        mut pings: mpsc::Receiver<Bytes>,
        mut data: mpsc::Receiver<Command>,
    ) {
        let cancel = self.shared.cancel.clone();
        let mut buf = BytesMut::with_capacity(RECV_BUFFER_SIZE);
        let mut close_written = false;

        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(command) = control.recv() => command,
                Some(payload) = pings.recv() => Command::Ping(payload, None),
                Some(command) = data.recv() => command,
                else => break,
            };

            if close_written {
                trace!("dropping frame queued after close");
                if let Some(ack) = command_ack(command) {
                    let _ = ack.send(Err(Error::ConnectionClosed));
                }
                continue;
            }

            let (ack, encoded) = match command {
                Command::Message(msg, ack) => {
                    (Some(ack), self.outbound.encode_message(&msg, &mut buf))
                }
                Command::Ping(payload, ack) => (ack, self.outbound.encode_ping(&payload, &mut buf)),
                Command::Pong(payload) => (None, self.outbound.encode_pong(&payload, &mut buf)),
                Command::Close { reason, ack } => {
                    close_written = true;
                    (ack, self.outbound.encode_close(reason.as_ref(), &mut buf))
                }
            };

            // A peer that stops reading must not pin the writer past closure
            let result = match encoded {
                Ok(()) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    res = write_out(&mut self.sink, &mut buf) => res,
                },
                Err(err) => {
                    buf.clear();
                    Err(err)
                }
            };

            match result {
                Ok(()) => {
                    if let Some(ack) = ack {
                        let _ = ack.send(Ok(()));
                    }
                }
                Err(Error::Io(err)) => {
                    let copy = io::Error::new(err.kind(), err.to_string());
                    if let Some(ack) = ack {
                        let _ = ack.send(Err(Error::Io(copy)));
                    }
                    self.shared.fail_transport(Error::Io(err));
                    break;
                }
                Err(err) => {
                    if let Some(ack) = ack {
                        let _ = ack.send(Err(err));
                    }
                }
            }
        }

        let _ = timeout(self.close_timeout, self.sink.shutdown()).await;
        trace!("writer stopped");
    }
}

async fn write_out<W>(sink: &mut W, buf: &mut BytesMut) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(&buf[..]).await?;
    sink.flush().await?;
    buf.clear();
    Ok(())
}

fn command_ack(command: Command) -> Option<Ack> {
    match command {
        Command::Message(_, ack) => Some(ack),
        Command::Ping(_, ack) | Command::Close { ack, .. } => ack,
        Command::Pong(_) => None,
    }
}
