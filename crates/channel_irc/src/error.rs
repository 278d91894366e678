use std::io;

use thiserror::Error;

/// Why a relay session ended and the reconnect loop took over.
///
/// Every variant is recoverable: the client sleeps for its current backoff
/// delay and starts a fresh session. Only [`Disconnect::escalates`] variants
/// grow that delay.
#[derive(Debug, Error)]
pub enum Disconnect {
    #[error("connect to {server} failed: {source}")]
    ConnectFailed {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("registration handshake failed while sending `{command}`: {source}")]
    HandshakeFailed {
        command: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("nick `{0}` is already in use")]
    NickInUse(String),

    #[error("removed from channel {0}")]
    RemovedFromChannel(String),

    #[error("connection closed by server")]
    ClosedByServer,

    #[error("write to server failed: {0}")]
    WriteFailed(#[source] io::Error),
}

impl Disconnect {
    /// True when the reconnect should back off harder than last time.
    pub fn escalates(&self) -> bool {
        matches!(self, Disconnect::ConnectFailed { .. } | Disconnect::NickInUse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connect_failures_and_nick_collisions_escalate() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(Disconnect::ConnectFailed { server: "irc:6667".into(), source: refused }.escalates());
        assert!(Disconnect::NickInUse("hub".into()).escalates());

        assert!(!Disconnect::ClosedByServer.escalates());
        assert!(!Disconnect::RemovedFromChannel("#s".into()).escalates());
        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert!(!Disconnect::WriteFailed(broken).escalates());
    }
}
