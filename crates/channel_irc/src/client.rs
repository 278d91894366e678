use std::time::Duration;

use strum_macros::Display;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::{mpsc, watch},
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backoff::{Backoff, DEFAULT_MAX, DEFAULT_SEED},
    error::Disconnect,
    line::{Kind, Line, Outbound},
};

/// Longest inbound line accepted before the connection is dropped.
pub const MAX_LINE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct IrcConfig {
    /// `host:port` of the IRC server.
    pub server: String,
    pub nick: String,
    pub channel: String,
    pub backoff_seed: Duration,
    pub backoff_max: Duration,
    /// Capacity of the queue between the socket reader task and the session loop.
    pub inbound_queue: usize,
}

impl IrcConfig {
    pub fn new(server: impl Into<String>, nick: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            nick: nick.into(),
            channel: channel.into(),
            backoff_seed: DEFAULT_SEED,
            backoff_max: DEFAULT_MAX,
            inbound_queue: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registering,
    Joining,
    Ready,
    ShuttingDown,
}

/// Protocol bookkeeping for one live transport.
///
/// A fresh `Session` is built for every connection attempt, so nothing about
/// a previous attempt (registration, channel membership) leaks into the next.
pub struct Session<W> {
    writer: W,
    nick: String,
    channel: String,
    registered: bool,
    joined: bool,
}

impl<W: AsyncWrite + Unpin + Send> Session<W> {
    pub fn new(writer: W, nick: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            writer,
            nick: nick.into(),
            channel: channel.into(),
            registered: false,
            joined: false,
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.registered, self.joined) {
            (true, true) => SessionState::Ready,
            (true, false) => SessionState::Joining,
            _ => SessionState::Registering,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.registered && self.joined
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    async fn send(&mut self, cmd: &Outbound) -> std::io::Result<()> {
        debug!(line = %cmd, "IRC >>");
        self.writer.write_all(cmd.to_wire().as_bytes()).await?;
        self.writer.flush().await
    }

    /// Announce identity and ask to join. Any failed write aborts the whole
    /// attempt; a half-done handshake is never resumed.
    pub async fn register(&mut self) -> Result<(), Disconnect> {
        let handshake = [
            Outbound::Nick(self.nick.clone()),
            Outbound::User(self.nick.clone()),
            Outbound::Join(self.channel.clone()),
        ];
        for cmd in &handshake {
            self.send(cmd).await.map_err(|source| Disconnect::HandshakeFailed {
                command: cmd.name(),
                source,
            })?;
        }
        Ok(())
    }

    /// Set the channel topic to `summary` if registered and joined.
    /// Returns whether anything was sent.
    pub async fn publish(&mut self, summary: &str) -> Result<bool, Disconnect> {
        if !self.is_ready() {
            debug!(state = %self.state(), "dropping summary, relay not ready");
            return Ok(false);
        }
        let topic = Outbound::Topic {
            channel: self.channel.clone(),
            text: summary.to_string(),
        };
        self.send(&topic).await.map_err(Disconnect::WriteFailed)?;
        Ok(true)
    }

    /// React to one line from the server.
    pub async fn handle_line(&mut self, raw: &str) -> Result<(), Disconnect> {
        let Some(line) = Line::parse(raw) else {
            return Ok(());
        };
        match line.kind() {
            Kind::Welcome => {
                info!("IRC: {} {}", line.command, line.params);
                self.registered = true;
            }
            Kind::Banner => {}
            Kind::NickInUse => {
                warn!("IRC: {raw}");
                return Err(Disconnect::NickInUse(self.nick.clone()));
            }
            Kind::NotOnChannel => {
                info!("IRC: {raw}");
                if line.is_not_on_channel(&self.nick, &self.channel) {
                    return Err(Disconnect::RemovedFromChannel(self.channel.clone()));
                }
            }
            Kind::Join => {
                info!("IRC: {raw}");
                if line.is_join_of(&self.nick, &self.channel) {
                    info!(nick = %self.nick, channel = %self.channel, "joined channel");
                    self.joined = true;
                }
            }
            Kind::Ping => {
                debug!("IRC: {raw}");
                self.send(&Outbound::Pong(line.params.clone()))
                    .await
                    .map_err(Disconnect::WriteFailed)?;
            }
            Kind::OtherNumeric => info!("IRC: {} {}", line.command, line.params),
            Kind::Other => info!("IRC: {raw}"),
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "closing IRC transport");
        }
    }
}

/// Keeps one IRC identity in one channel and mirrors summaries into the
/// channel topic, reconnecting forever until cancelled.
pub struct RelayClient {
    config: IrcConfig,
    backoff: Backoff,
    summaries: mpsc::Receiver<String>,
    summaries_open: bool,
    cancel: CancellationToken,
    state_tx: watch::Sender<SessionState>,
}

impl RelayClient {
    pub fn new(
        config: IrcConfig,
        summaries: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(config.backoff_seed, config.backoff_max);
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            backoff,
            summaries,
            summaries_open: true,
            cancel,
            state_tx,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn current_delay(&self) -> Duration {
        self.backoff.current()
    }

    /// Run until the cancellation token fires.
    pub async fn run(mut self) {
        info!(server = %self.config.server, nick = %self.config.nick, channel = %self.config.channel, "starting IRC relay");
        loop {
            let delay = self.backoff.current();
            debug!(delay_ms = delay.as_millis() as u64, "waiting before IRC connect");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
            if self.cancel.is_cancelled() {
                break;
            }
            match self.session().await {
                Ok(()) => break,
                Err(reason) => self.reconnect(reason),
            }
        }
        self.set_state(SessionState::ShuttingDown);
        info!("IRC relay shut down");
    }

    /// Single transition back to `Disconnected`, used by every failure path.
    fn reconnect(&mut self, reason: Disconnect) {
        if reason.escalates() {
            self.backoff.grow();
        }
        warn!(
            reason = %reason,
            next_delay_ms = self.backoff.current().as_millis() as u64,
            "IRC session ended, reconnecting"
        );
        self.set_state(SessionState::Disconnected);
    }

    fn apply_state(&mut self, state: SessionState) {
        if state == SessionState::Ready {
            self.backoff.reset();
        }
        self.set_state(state);
    }

    fn set_state(&self, state: SessionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(state = %state, "IRC relay state");
        }
    }

    /// One connection attempt from dial to disconnect. `Ok` means shutdown.
    async fn session(&mut self) -> Result<(), Disconnect> {
        self.set_state(SessionState::Connecting);
        info!(server = %self.config.server, "IRC connecting");
        let stream = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            res = TcpStream::connect(&self.config.server) => res.map_err(|source| Disconnect::ConnectFailed {
                server: self.config.server.clone(),
                source,
            })?,
        };
        let (reader, writer) = stream.into_split();
        let mut session = Session::new(writer, self.config.nick.clone(), self.config.channel.clone());

        self.set_state(SessionState::Registering);
        session.register().await?;

        let (line_tx, mut lines) = mpsc::channel(self.config.inbound_queue);
        let reader_cancel = self.cancel.child_token();
        tokio::spawn(read_lines(reader, line_tx, reader_cancel.clone()));
        let _reader_guard = reader_cancel.drop_guard();

        let result = self.serve(&mut session, &mut lines).await;
        info!("closing IRC connection");
        session.close().await;
        result
    }

    async fn serve<W: AsyncWrite + Unpin + Send>(
        &mut self,
        session: &mut Session<W>,
        lines: &mut mpsc::Receiver<String>,
    ) -> Result<(), Disconnect> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("shutting down IRC relay (connected)");
                    return Ok(());
                }
                summary = self.summaries.recv(), if self.summaries_open => match summary {
                    Some(text) => {
                        session.publish(&text).await?;
                    }
                    None => {
                        debug!("summary channel closed");
                        self.summaries_open = false;
                    }
                },
                line = lines.recv() => match line {
                    Some(raw) => {
                        let before = session.state();
                        session.handle_line(&raw).await?;
                        let after = session.state();
                        if after != before {
                            self.apply_state(after);
                        }
                    }
                    None => return Err(Disconnect::ClosedByServer),
                },
            }
        }
    }
}

/// Forward decoded server lines into the session queue until EOF, error or
/// cancellation. Dropping `tx` is what tells the session the server is gone.
async fn read_lines<R: AsyncRead + Unpin>(
    reader: R,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(512);
    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE as u64);
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("IRC reader cancelled");
                return;
            }
            read = limited.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => {
                info!("IRC connection closed by server");
                return;
            }
            Ok(n) if n == MAX_LINE && buf.last() != Some(&b'\n') => {
                warn!(limit = MAX_LINE, "IRC line too long, dropping connection");
                return;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(line) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "IRC read failed");
                return;
            }
        }
    }
}
