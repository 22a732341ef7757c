//! Frame transport abstraction over the websocket.
//!
//! The data channel only needs two narrow capabilities: a source of inbound
//! frames and a sink for outbound ones. Splitting them lets the reader loop
//! and the writer (shared with the retransmission sweeper) run without
//! contending for one connection object, and lets tests substitute an
//! in-memory pair.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Error, Result};

/// One inbound websocket event, reduced to what the data channel handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A binary frame carrying one encoded `AgentMessage`.
    Binary(Bytes),
    /// The peer closed the stream, with the close code if one was sent.
    Closed(Option<u16>),
}

/// Source of inbound frames.
#[async_trait]
pub trait FrameSource: Send {
    /// The next binary frame or close event. Control and text frames are
    /// not part of the sub-protocol and are skipped.
    async fn next_frame(&mut self) -> Result<Frame>;
}

/// Sink for outbound frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a text frame (only used for the initial open frame).
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Send a binary frame.
    async fn send_binary(&mut self, data: Bytes) -> Result<()>;

    /// Close the stream; closing an already-closed stream is not an error.
    async fn close(&mut self) -> Result<()>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reader half of a live websocket.
pub struct WsFrameSource {
    stream: SplitStream<WsStream>,
}

/// Writer half of a live websocket.
pub struct WsFrameSink {
    sink: SplitSink<WsStream, WsMessage>,
}

/// Dial the stream URL returned by `StartSession`.
pub async fn connect(url: &str) -> Result<(WsFrameSource, WsFrameSink)> {
    let (ws, response) = connect_async(url)
        .await
        .map_err(|e| Error::transport(format!("websocket dial failed: {e}")))?;
    debug!(status = %response.status(), "websocket connected");

    let (sink, stream) = ws.split();
    Ok((WsFrameSource { stream }, WsFrameSink { sink }))
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => return Ok(Frame::Binary(data.into())),
                Some(Ok(WsMessage::Close(frame))) => {
                    return Ok(Frame::Closed(frame.map(|f| u16::from(f.code))));
                }
                // ping/pong/text are transport noise for this sub-protocol
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) | None => {
                    return Ok(Frame::Closed(None));
                }
                Some(Err(e)) => return Err(Error::transport(format!("websocket read: {e}"))),
            }
        }
    }
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(WsMessage::Text(text))
            .await
            .map_err(map_send_error)
    }

    async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.sink
            .send(WsMessage::Binary(data.to_vec()))
            .await
            .map_err(map_send_error)
    }

    async fn close(&mut self) -> Result<()> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Error::transport(format!("websocket close: {e}"))),
        }
    }
}

fn map_send_error(err: WsError) -> Error {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Error::EndOfStream,
        other => Error::transport(format!("websocket write: {other}")),
    }
}
