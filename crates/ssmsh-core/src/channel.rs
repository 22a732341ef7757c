//! The SSM data channel.
//!
//! One channel owns one websocket and drives the session protocol over it:
//! per-direction sequence numbers, acknowledgements, the reorder and
//! retransmit buffers used while the handshake is in flight, publication
//! pause/resume, and the control messages that end a session.
//!
//! Concurrency model: the writer half of the websocket, together with the
//! SYN-sent flag, lives under one async mutex; every send (data, ack,
//! retransmit, control) goes through it, so bytes leave the socket in the
//! order sequence numbers were assigned. The reader half has its own lock
//! and is pumped by whichever task is consuming the channel. A background
//! sweeper retransmits unacknowledged messages every 500ms until the
//! outbound buffer is dropped at handshake completion or the channel dies;
//! it holds only a weak reference so an abandoned channel is reclaimed.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::api::{SessionApi, StartSessionInput};
use crate::buffer::MessageBuffer;
use crate::constants::{
    AGENT_MSG_HEADER_LEN, MESSAGE_BUFFER_CAPACITY, MESSAGE_SCHEMA_VERSION, RESEND_INTERVAL,
    WS_FRAME_SIZE,
};
use crate::error::{Error, Result};
use crate::protocol::{
    build_handshake_response, AcknowledgeContent, AgentMessage, ChannelClosedPayload,
    HandshakeCompletePayload, HandshakeRequestPayload, MessageFlags, MessageType,
    OpenDataChannelInput, PayloadType, PayloadTypeFlag, TerminalDimensions,
};
use crate::transport::{self, Frame, FrameSink, FrameSource};

/// What [`DataChannel::handle_message`] produced for the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// Payload bytes to forward to the local sink.
    Output(Bytes),
    /// The message was consumed internally; nothing to forward.
    Consumed,
    /// The agent closed the channel. Any final output is delivered before
    /// the caller treats the channel as ended.
    Closed { output: Option<Bytes> },
}

/// A live data channel to the agent on one instance.
pub struct DataChannel {
    shared: Arc<Shared>,
    reader: AsyncMutex<Box<dyn FrameSource>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// State reachable from the retransmission sweeper.
struct Shared {
    writer: AsyncMutex<Writer>,
    /// Outbound sequence counter; senders take the next value at send time.
    out_seq: AtomicI64,
    /// Next inbound sequence number expected by the reorder buffer.
    in_seq: AtomicI64,
    paused: AtomicBool,
    handshake_done: AtomicBool,
    closed: AtomicBool,
    out_buf: Mutex<Option<Arc<MessageBuffer>>>,
    in_buf: Mutex<Option<Arc<MessageBuffer>>>,
}

struct Writer {
    sink: Box<dyn FrameSink>,
    /// The first message on a channel carries the SYN flag and sequence 0,
    /// whatever it is. Guarded by the writer mutex with the sink so the SYN
    /// cannot race a concurrent send.
    syn_sent: bool,
}

impl DataChannel {
    /// Start a session through the control plane and open its data channel:
    /// dial the stream URL, send the token-bearing open frame and start the
    /// retransmission sweeper.
    pub async fn open(api: &dyn SessionApi, input: &StartSessionInput) -> Result<Self> {
        let session = api.start_session(input).await?;
        debug!(session_id = %session.session_id, "session started");

        let (source, sink) = transport::connect(&session.stream_url).await?;
        let channel = Self::from_parts(Box::new(source), Box::new(sink));

        if let Err(e) = channel.send_open_frame(&session.token_value).await {
            let _ = channel.close().await;
            return Err(e);
        }
        Ok(channel)
    }

    /// Build a channel over an already-connected frame transport. Buffers
    /// are allocated and the sweeper started; no open frame is sent.
    pub fn from_parts(source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) -> Self {
        let shared = Arc::new(Shared {
            writer: AsyncMutex::new(Writer {
                sink,
                syn_sent: false,
            }),
            out_seq: AtomicI64::new(0),
            in_seq: AtomicI64::new(0),
            paused: AtomicBool::new(false),
            handshake_done: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            out_buf: Mutex::new(Some(Arc::new(MessageBuffer::new(MESSAGE_BUFFER_CAPACITY)))),
            in_buf: Mutex::new(Some(Arc::new(MessageBuffer::new(MESSAGE_BUFFER_CAPACITY)))),
        });

        let sweeper = tokio::spawn(resend_loop(Arc::downgrade(&shared)));

        Self {
            shared,
            reader: AsyncMutex::new(source),
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Close the websocket. Idempotent; type-specific farewells such as
    /// `TerminateSession` must be sent beforehand.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.shared.writer.lock().await;
        writer.sink.close().await
    }

    /// Read exactly one binary frame from the websocket.
    ///
    /// Frames shorter than an agent-message header fail with
    /// [`Error::ShortFrame`]; close codes 1000/1001/1006 (and a bare end of
    /// stream) surface as [`Error::EndOfStream`].
    pub async fn read_frame(&self) -> Result<Bytes> {
        let mut reader = self.reader.lock().await;
        match reader.next_frame().await? {
            Frame::Binary(data) => {
                if data.len() < AGENT_MSG_HEADER_LEN {
                    return Err(Error::ShortFrame { len: data.len() });
                }
                Ok(data)
            }
            Frame::Closed(code) => match code {
                None | Some(1000) | Some(1001) | Some(1006) => Err(Error::EndOfStream),
                Some(code) => Err(Error::transport(format!(
                    "websocket closed with code {code}"
                ))),
            },
        }
    }

    /// Send payload bytes as an `input_stream_data`/`Output` message.
    pub async fn write(&self, payload: &[u8]) -> Result<usize> {
        let mut msg = AgentMessage::new(MessageType::InputStreamData);
        msg.payload_type = PayloadType::Output;
        msg.sequence_number = self.next_seq();
        msg.payload = Bytes::copy_from_slice(payload);
        self.write_message(msg).await
    }

    /// Low-level send.
    ///
    /// The first message ever sent is rewritten to `Syn`/sequence 0 and
    /// resets the outbound counter. Acknowledge messages and handshake
    /// responses are never buffered for retransmission. While publication is
    /// paused the message is buffered but not transmitted; the sweeper
    /// flushes it after resume.
    pub async fn write_message(&self, mut msg: AgentMessage) -> Result<usize> {
        let mut writer = self.shared.writer.lock().await;

        if !writer.syn_sent {
            self.shared.out_seq.store(0, Ordering::SeqCst);
            msg.flags = MessageFlags::Syn;
            msg.sequence_number = 0;
        }

        let data = msg.encode()?;
        writer.syn_sent = true;

        let n = msg.payload.len();
        let retransmittable = msg.message_type != MessageType::Acknowledge
            && msg.payload_type != PayloadType::HandshakeResponse;
        if retransmittable {
            if let Some(buf) = self.out_buf() {
                if buf.add(msg).is_err() {
                    // soft condition: the message still goes out once
                    warn!("outbound retransmit buffer full, message sent unbuffered");
                }
            }
        }

        if self.shared.paused.load(Ordering::SeqCst) {
            trace!("publication paused, message held");
            return Ok(n);
        }

        writer.sink.send_binary(data).await?;
        Ok(n)
    }

    /// Decode one inbound frame and run the state machine on it.
    pub async fn handle_message(&self, data: &[u8]) -> Result<InboundEvent> {
        let msg = AgentMessage::decode(data)?;
        trace!(%msg, "inbound");

        match (msg.message_type.clone(), msg.payload_type) {
            (MessageType::Acknowledge, _) => {
                if let Some(buf) = self.out_buf() {
                    buf.remove(msg.sequence_number);
                }
                // acknowledgements are not themselves acknowledged
                return self.drain_inbound();
            }
            (MessageType::PausePublication, _) => {
                self.shared.paused.store(true, Ordering::SeqCst);
                debug!("publication paused by agent");
            }
            (MessageType::StartPublication, _) => {
                self.shared.paused.store(false, Ordering::SeqCst);
                debug!("publication resumed by agent");
            }
            (MessageType::OutputStreamData, PayloadType::Output) => {
                return self.handle_output(msg).await;
            }
            (MessageType::OutputStreamData, PayloadType::HandshakeRequest) => {
                // a handshake failure is fatal for the session
                self.handle_handshake_request(&msg).await?;
            }
            (MessageType::OutputStreamData, PayloadType::HandshakeComplete) => {
                self.complete_handshake(&msg);
            }
            (MessageType::ChannelClosed, _) => {
                return self.handle_channel_closed(&msg).await;
            }
            (message_type, payload_type) => {
                return Err(Error::UnknownMessage {
                    message_type: message_type.as_str().to_string(),
                    payload_type: payload_type.to_wire(),
                });
            }
        }

        self.send_ack(&msg).await?;
        self.drain_inbound()
    }

    /// Read and handle frames until the agent reports handshake completion,
    /// then switch the channel to unbuffered streaming.
    pub async fn wait_for_handshake_complete(&self) -> Result<()> {
        loop {
            if self.shared.handshake_done.load(Ordering::SeqCst) {
                // dropping the outbound buffer also retires the sweeper
                *lock(&self.shared.in_buf) = None;
                *lock(&self.shared.out_buf) = None;
                debug!("handshake complete, streaming unbuffered");
                return Ok(());
            }

            let frame = self.read_frame().await?;
            self.handle_message(&frame).await?;
        }
    }

    /// True once the agent has reported handshake completion.
    pub fn handshake_complete(&self) -> bool {
        self.shared.handshake_done.load(Ordering::SeqCst)
    }

    /// Tell the agent the size of the local terminal.
    pub async fn set_terminal_size(&self, rows: u32, cols: u32) -> Result<()> {
        let mut msg = AgentMessage::new(MessageType::InputStreamData);
        msg.sequence_number = self.next_seq();
        msg.payload_type = PayloadType::Size;
        msg.payload = serde_json::to_vec(&TerminalDimensions { cols, rows })?.into();
        self.write_message(msg).await?;
        Ok(())
    }

    /// End the session so the agent can release its resources. Sent with the
    /// `Fin` flag; the websocket should be closed afterwards.
    pub async fn terminate_session(&self) -> Result<()> {
        self.send_flag(MessageFlags::Fin, PayloadTypeFlag::TerminateSession)
            .await
    }

    /// Ask the agent to reset its upstream socket while keeping the session
    /// alive, so the next local connection reuses this channel.
    pub async fn disconnect_port(&self) -> Result<()> {
        self.send_flag(MessageFlags::Data, PayloadTypeFlag::DisconnectToPort)
            .await
    }

    /// Pump a local byte source into the channel until it reports EOF.
    pub async fn copy_from<R>(&self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; WS_FRAME_SIZE];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.write(&buf[..n]).await?;
            total += n as u64;
        }
    }

    /// Pump inbound payloads into a local sink until the channel ends.
    /// A clean shutdown (`channel_closed` or websocket close) returns `Ok`.
    pub async fn copy_to<W>(&self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;
        loop {
            let frame = match self.read_frame().await {
                Ok(frame) => frame,
                Err(Error::EndOfStream) => return Ok(total),
                Err(e) => return Err(e),
            };

            match self.handle_message(&frame).await? {
                InboundEvent::Output(payload) => {
                    writer.write_all(&payload).await?;
                    writer.flush().await?;
                    total += payload.len() as u64;
                }
                InboundEvent::Consumed => {}
                InboundEvent::Closed { output } => {
                    if let Some(payload) = output {
                        writer.write_all(&payload).await?;
                        writer.flush().await?;
                        total += payload.len() as u64;
                    }
                    return Ok(total);
                }
            }
        }
    }

    async fn send_open_frame(&self, token: &str) -> Result<()> {
        let open = OpenDataChannelInput {
            message_schema_version: MESSAGE_SCHEMA_VERSION.to_string(),
            request_id: Uuid::new_v4().to_string(),
            token_value: token.to_string(),
        };
        let text = serde_json::to_string(&open)?;

        let mut writer = self.shared.writer.lock().await;
        writer.sink.send_text(text).await
    }

    fn next_seq(&self) -> i64 {
        self.shared.out_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn out_buf(&self) -> Option<Arc<MessageBuffer>> {
        lock(&self.shared.out_buf).clone()
    }

    fn in_buf(&self) -> Option<Arc<MessageBuffer>> {
        lock(&self.shared.in_buf).clone()
    }

    async fn handle_output(&self, msg: AgentMessage) -> Result<InboundEvent> {
        let Some(buf) = self.in_buf() else {
            // streaming mode: deliver immediately
            self.send_ack(&msg).await?;
            return Ok(InboundEvent::Output(msg.payload));
        };

        let expected = self.shared.in_seq.load(Ordering::SeqCst);
        if msg.sequence_number < expected {
            trace!(seq = msg.sequence_number, expected, "duplicate discarded");
            self.send_ack(&msg).await?;
            return Ok(InboundEvent::Consumed);
        }

        buf.add(msg.clone())?;
        self.send_ack(&msg).await?;
        self.drain_inbound()
    }

    /// Deliver queued messages in sequence order, starting at the expected
    /// inbound sequence number and advancing it for each one drained.
    fn drain_inbound(&self) -> Result<InboundEvent> {
        let Some(buf) = self.in_buf() else {
            return Ok(InboundEvent::Consumed);
        };

        let mut data = BytesMut::new();
        loop {
            let expected = self.shared.in_seq.load(Ordering::SeqCst);
            let Some(msg) = buf.get(expected) else {
                break;
            };
            self.shared.in_seq.fetch_add(1, Ordering::SeqCst);
            data.put_slice(&msg.payload);
            buf.remove(msg.sequence_number);
        }

        if data.is_empty() {
            Ok(InboundEvent::Consumed)
        } else {
            Ok(InboundEvent::Output(data.freeze()))
        }
    }

    async fn handle_handshake_request(&self, msg: &AgentMessage) -> Result<()> {
        let request: HandshakeRequestPayload = serde_json::from_slice(&msg.payload)?;
        debug!(
            agent_version = %request.agent_version,
            actions = request.requested_client_actions.len(),
            "handshake request"
        );

        let response = build_handshake_response(&request.requested_client_actions);

        let mut out = AgentMessage::new(MessageType::InputStreamData);
        // the response reuses the request's sequence number
        out.sequence_number = msg.sequence_number;
        out.payload_type = PayloadType::HandshakeResponse;
        out.payload = serde_json::to_vec(&response)?.into();
        self.write_message(out).await?;
        Ok(())
    }

    fn complete_handshake(&self, msg: &AgentMessage) {
        // one-shot latch; the agent occasionally repeats itself on shutdown
        if self.shared.handshake_done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(payload) = serde_json::from_slice::<HandshakeCompletePayload>(&msg.payload) {
            if payload.customer_message.is_empty() {
                debug!("handshake complete");
            } else {
                debug!(message = %payload.customer_message, "handshake complete");
            }
        }
    }

    async fn handle_channel_closed(&self, msg: &AgentMessage) -> Result<InboundEvent> {
        let payload: ChannelClosedPayload = serde_json::from_slice(&msg.payload)?;
        debug!(session_id = %payload.session_id, "channel closed by agent");

        // best effort: the peer may already be gone
        if let Err(e) = self.send_ack(msg).await {
            debug!(error = %e, "acknowledge of channel_closed not sent");
        }

        let output = if payload.output.is_empty() {
            None
        } else {
            Some(Bytes::from(payload.output.into_bytes()))
        };
        Ok(InboundEvent::Closed { output })
    }

    /// Acknowledge one inbound message, echoing its sequence number.
    async fn send_ack(&self, msg: &AgentMessage) -> Result<()> {
        let content = AcknowledgeContent {
            acknowledged_message_type: msg.message_type.as_str().to_string(),
            acknowledged_message_id: msg.message_id.to_string(),
            acknowledged_message_sequence_number: msg.sequence_number,
            is_sequential_message: true,
        };

        let mut ack = AgentMessage::new(MessageType::Acknowledge);
        ack.flags = MessageFlags::Ack;
        ack.sequence_number = msg.sequence_number;
        ack.payload = serde_json::to_vec(&content)?.into();
        self.write_message(ack).await?;
        Ok(())
    }

    async fn send_flag(&self, flags: MessageFlags, flag: PayloadTypeFlag) -> Result<()> {
        let mut msg = AgentMessage::new(MessageType::InputStreamData);
        msg.flags = flags;
        msg.sequence_number = self.next_seq();
        msg.payload_type = PayloadType::Flag;
        msg.payload = Bytes::copy_from_slice(&flag.to_wire().to_be_bytes());
        self.write_message(msg).await?;
        Ok(())
    }
}

impl Drop for DataChannel {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.sweeper).take() {
            handle.abort();
        }
    }
}

/// Retransmit unacknowledged outbound messages every 500ms.
///
/// Acknowledged messages are removed from the buffer, so a sweep eventually
/// quiesces. There is deliberately no backoff and no retry cap, matching the
/// service protocol's expectations during the handshake window.
async fn resend_loop(shared: Weak<Shared>) {
    let mut ticker = tokio::time::interval(RESEND_INTERVAL);
    loop {
        ticker.tick().await;

        let Some(shared) = shared.upgrade() else {
            return;
        };
        if shared.closed.load(Ordering::SeqCst) {
            return;
        }
        if shared.paused.load(Ordering::SeqCst) {
            continue;
        }
        let Some(buf) = lock(&shared.out_buf).clone() else {
            // buffer dropped at handshake completion; sweeping is over
            return;
        };

        while let Some(msg) = buf.next() {
            trace!(seq = msg.sequence_number, "retransmitting");
            let data = match msg.encode() {
                Ok(data) => data,
                Err(e) => {
                    warn!(seq = msg.sequence_number, error = %e, "unencodable buffered message");
                    buf.remove(msg.sequence_number);
                    continue;
                }
            };
            let mut writer = shared.writer.lock().await;
            if let Err(e) = writer.sink.send_binary(data).await {
                debug!(seq = msg.sequence_number, error = %e, "retransmission failed");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
