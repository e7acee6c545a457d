use anyhow::{Context, anyhow};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::events::{EventSender, LinkEvent};
use crate::protocol::{ServerMessage, SetupMessage, TransportPacket};

/// A live connection to the remote voice service.
pub trait RemoteLink: Send {
    fn send(&mut self, packet: &TransportPacket) -> anyhow::Result<()>;

    /// Close the connection. Repeated calls are no-ops.
    fn close(&mut self);
}

/// Opens [`RemoteLink`]s. Open/message/close/error arrive through `events`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        setup: SetupMessage,
        events: EventSender,
    ) -> anyhow::Result<Box<dyn RemoteLink>>;
}

#[derive(Debug)]
pub enum NetCommand {
    SendText(String),
    Close,
}

/// Gemini Live over WebSocket.
pub struct LiveConnector {
    ws_url: String,
    api_key: String,
}

impl LiveConnector {
    pub fn new(ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.ws_url)
            .with_context(|| format!("Invalid WebSocket URL '{}'", self.ws_url))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl Connector for LiveConnector {
    async fn connect(
        &self,
        setup: SetupMessage,
        events: EventSender,
    ) -> anyhow::Result<Box<dyn RemoteLink>> {
        if self.api_key.is_empty() {
            anyhow::bail!("No API key configured");
        }
        let url = self.endpoint()?;

        log::info!("Connecting to {}...", self.ws_url);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .context("WebSocket handshake failed")?;
        log::info!("Connected, sending setup for {}", setup.setup.model);

        let (mut write, mut read) = ws_stream.split();

        // 第一条消息必须是 setup，服务端回复 setupComplete 后才算握手完成
        let setup_json = serde_json::to_string(&setup)?;
        write.send(Message::Text(setup_json.into())).await?;

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<NetCommand>();

        tokio::spawn(async move {
            let outcome: Result<String, String> = loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => dispatch(text.as_str(), &events),
                            Some(Ok(Message::Binary(data))) => {
                                // Live 服务有时用二进制帧承载 JSON
                                match std::str::from_utf8(&data) {
                                    Ok(text) => dispatch(text, &events),
                                    Err(_) => log::warn!("Ignoring non-UTF-8 binary frame ({} bytes)", data.len()),
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                log::info!("Server closed connection: {:?}", frame);
                                let reason = frame
                                    .map(|f| f.reason.as_str().to_string())
                                    .unwrap_or_default();
                                break Ok(reason);
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => break Err(e.to_string()),
                            None => break Ok("connection closed".to_string()),
                        }
                    }
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(NetCommand::SendText(text)) => {
                                if let Err(e) = write.send(Message::Text(text.into())).await {
                                    break Err(e.to_string());
                                }
                            }
                            Some(NetCommand::Close) | None => {
                                let _ = write.send(Message::Close(None)).await;
                                log::info!("Live link closed locally");
                                return;
                            }
                        }
                    }
                }
            };

            match outcome {
                Ok(reason) => events.link(LinkEvent::Closed(reason)),
                Err(e) => {
                    log::error!("Live link error: {}", e);
                    events.link(LinkEvent::Error(e))
                }
            };
        });

        Ok(Box::new(LiveLink {
            cmd_tx,
            closed: false,
        }))
    }
}

fn dispatch(text: &str, events: &EventSender) {
    match ServerMessage::parse(text) {
        Ok(msg) if msg.is_setup_complete() => {
            log::info!("Setup complete, session open");
            events.link(LinkEvent::Open);
        }
        Ok(msg) => {
            events.link(LinkEvent::Message(msg));
        }
        Err(e) => log::warn!("Unparseable server message: {}", e),
    }
}

struct LiveLink {
    cmd_tx: mpsc::UnboundedSender<NetCommand>,
    closed: bool,
}

impl RemoteLink for LiveLink {
    fn send(&mut self, packet: &TransportPacket) -> anyhow::Result<()> {
        if self.closed {
            anyhow::bail!("Live link is closed");
        }
        let text = packet.to_realtime_input()?;
        self.cmd_tx
            .send(NetCommand::SendText(text))
            .map_err(|_| anyhow!("Live link task has exited"))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.cmd_tx.send(NetCommand::Close);
        }
    }
}
