use futures_util::{SinkExt, StreamExt};
use tasksync_core::TaskId;
use tasksync_logging::sync_trace;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::transport::{Inbound, PushConnector, PushSocket};
use crate::{SyncSettings, TransportError};

/// Close code reported when a close frame carries no status.
const NO_STATUS: u16 = 1005;

/// Websocket connector for `{ws_base}/ws/progress/{task_id}`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    settings: SyncSettings,
}

impl WsConnector {
    pub fn new(settings: SyncSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, task_id: &TaskId) -> Result<Box<dyn PushSocket>, TransportError> {
        let url = self.settings.push_url(task_id)?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        Ok(Box::new(WsSocket { stream }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl PushSocket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| TransportError::Socket(err.to_string()))
    }

    async fn recv(&mut self) -> Option<Inbound> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Inbound::Error(err.to_string())),
            };
            match message {
                Message::Text(text) => return Some(Inbound::Text(text.as_str().to_owned())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Inbound::Text(text)),
                    Err(_) => sync_trace!("ignoring non-utf8 binary frame"),
                },
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        None => (NO_STATUS, String::new()),
                    };
                    return Some(Inbound::Closed { code, reason });
                }
                // Pings are answered by tungstenite on the next read.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|err| TransportError::Socket(err.to_string()))
    }
}
