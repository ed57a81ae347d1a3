// WebSocket transport.
//
// Each text message is one frame. Pings are answered by tungstenite, binary
// messages are ignored, and a close frame ends the connection.

use futures_util::future::BoxFuture;
use futures_util::{StreamExt, future};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tracing::{debug, info, trace};
use url::Url;

use super::{Connector, FrameStream, StreamFrame};
use crate::error::Error;

/// Push-stream connector over `ws://` / `wss://`.
pub struct WebSocketConnector {
    url: Url,
    authorization: Option<String>,
}

impl WebSocketConnector {
    /// `authorization` is sent verbatim as the `Authorization` header on the
    /// upgrade request (see `TransportConfig::authorization_header`).
    pub fn new(url: Url, authorization: Option<String>) -> Self {
        Self { url, authorization }
    }

    async fn open(&self) -> Result<FrameStream, Error> {
        info!(url = %self.url, "connecting to update websocket");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::StreamConnect(e.to_string()))?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(value) = &self.authorization {
            request = request.with_header("Authorization", value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(resp)
                    if resp.status() == tungstenite::http::StatusCode::UNAUTHORIZED
                        || resp.status() == tungstenite::http::StatusCode::FORBIDDEN =>
                {
                    Error::Authentication {
                        message: format!("websocket upgrade rejected with HTTP {}", resp.status()),
                    }
                }
                other => Error::StreamConnect(other.to_string()),
            })?;

        debug!("update websocket connected");

        let (_write, read) = ws_stream.split();
        let frames = read
            .map(|msg| msg.map_err(|e| Error::StreamConnect(e.to_string())))
            .take_while(|msg| {
                let open = match msg {
                    Ok(tungstenite::Message::Close(frame)) => {
                        if let Some(cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "websocket close frame received");
                        } else {
                            info!("websocket close frame received (no payload)");
                        }
                        false
                    }
                    _ => true,
                };
                future::ready(open)
            })
            .filter_map(|msg| {
                let frame = match msg {
                    Ok(tungstenite::Message::Text(text)) => {
                        Some(Ok(StreamFrame::text(text.as_str())))
                    }
                    Ok(tungstenite::Message::Ping(_)) => {
                        // tungstenite handles pong replies automatically
                        trace!("websocket ping");
                        None
                    }
                    // Binary, Pong, Frame -- ignore
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                };
                future::ready(frame)
            });

        Ok(frames.boxed())
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, Error>> {
        Box::pin(self.open())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_is_a_connect_error() {
        let url = Url::parse("ws://127.0.0.1:1/devices/d1/updates").unwrap();
        let connector = WebSocketConnector::new(url, None);
        let result = connector.connect().await;
        assert!(matches!(result, Err(Error::StreamConnect(_))));
    }
}
