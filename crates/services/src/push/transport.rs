use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::PushError;

use super::reconnect::ABNORMAL_CLOSURE;

/// Close frame that carried no status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Inbound event the supervisor cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Closed(u16),
}

/// One open push connection.
#[async_trait]
pub trait PushConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), PushError>;

    /// Next text frame, or `Closed` once the peer is gone. Must be cancel-safe.
    async fn next_frame(&mut self) -> Frame;

    /// Best effort; errors are logged, not returned.
    async fn close(&mut self, code: u16);
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn PushConnection>, PushError>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn PushConnection>, PushError> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| PushError::Connect(err.to_string()))?;
        tracing::debug!(url = %url, "push socket open");
        Ok(Box::new(WsConnection { stream }))
    }
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), PushError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| PushError::Send(err.to_string()))
    }

    async fn next_frame(&mut self) -> Frame {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    return Frame::Closed(
                        frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code)),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "push socket read failed");
                    return Frame::Closed(ABNORMAL_CLOSURE);
                }
                None => return Frame::Closed(ABNORMAL_CLOSURE),
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: code.into(),
            reason: String::new().into(),
        };
        if let Err(err) = self.stream.close(Some(frame)).await {
            tracing::debug!(error = %err, "push socket close failed");
        }
    }
}
