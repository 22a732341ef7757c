//! In-memory frame transport for exercising the data channel without a
//! network.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use ssmsh_core::error::{Error, Result};
use ssmsh_core::protocol::AgentMessage;
use ssmsh_core::transport::{Frame, FrameSink, FrameSource};

/// A frame the client pushed into its sink, as observed by the fake agent.
#[derive(Debug, Clone)]
pub enum SentFrame {
    Text(String),
    Binary(Bytes),
}

/// Client-side source half backed by a channel.
pub struct MockFrameSource {
    rx: mpsc::UnboundedReceiver<Frame>,
}

/// Client-side sink half backed by a channel.
pub struct MockFrameSink {
    tx: mpsc::UnboundedSender<SentFrame>,
    closed: bool,
}

/// The agent's side of a mock transport: feed frames to the client and
/// observe what it sends.
pub struct AgentHandle {
    to_client: mpsc::UnboundedSender<Frame>,
    from_client: mpsc::UnboundedReceiver<SentFrame>,
}

/// Build a connected transport: the source/sink pair goes to
/// `DataChannel::from_parts`, the handle stays with the test.
pub fn mock_transport() -> (MockFrameSource, MockFrameSink, AgentHandle) {
    let (to_client, client_rx) = mpsc::unbounded_channel();
    let (client_tx, from_client) = mpsc::unbounded_channel();

    (
        MockFrameSource { rx: client_rx },
        MockFrameSink {
            tx: client_tx,
            closed: false,
        },
        AgentHandle {
            to_client,
            from_client,
        },
    )
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn next_frame(&mut self) -> Result<Frame> {
        Ok(self.rx.recv().await.unwrap_or(Frame::Closed(None)))
    }
}

#[async_trait]
impl FrameSink for MockFrameSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(SentFrame::Text(text))
    }

    async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.send(SentFrame::Binary(data))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl MockFrameSink {
    fn send(&mut self, frame: SentFrame) -> Result<()> {
        if self.closed {
            return Err(Error::EndOfStream);
        }
        self.tx.send(frame).map_err(|_| Error::EndOfStream)
    }
}

impl AgentHandle {
    /// Deliver an encoded message to the client as a binary frame.
    pub fn send_message(&self, msg: &AgentMessage) {
        let data = msg.encode().expect("test message encodes");
        self.send_frame(Frame::Binary(data));
    }

    /// Deliver a raw frame to the client.
    pub fn send_frame(&self, frame: Frame) {
        let _ = self.to_client.send(frame);
    }

    /// Signal a websocket close to the client.
    pub fn close(&self, code: Option<u16>) {
        self.send_frame(Frame::Closed(code));
    }

    /// Next frame the client sent, in order.
    pub async fn next_sent(&mut self) -> Option<SentFrame> {
        self.from_client.recv().await
    }

    /// Next binary frame the client sent, decoded; text frames are skipped.
    pub async fn next_message(&mut self) -> Option<AgentMessage> {
        loop {
            match self.from_client.recv().await? {
                SentFrame::Binary(data) => {
                    return Some(AgentMessage::decode(&data).expect("client frame decodes"));
                }
                SentFrame::Text(_) => continue,
            }
        }
    }

    /// Next decoded binary frame, if one is already waiting.
    pub fn try_next_message(&mut self) -> Option<AgentMessage> {
        loop {
            match self.from_client.try_recv().ok()? {
                SentFrame::Binary(data) => {
                    return Some(AgentMessage::decode(&data).expect("client frame decodes"));
                }
                SentFrame::Text(_) => continue,
            }
        }
    }
}
