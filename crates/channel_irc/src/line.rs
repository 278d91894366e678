//! The slice of the IRC line grammar the relay needs.
//!
//! Inbound lines are split into `(:prefix )?command params`; outbound lines
//! are built by [`Outbound`] and terminated with CRLF on the wire.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(:\S+)\s+)?(\S+)\s*(.*)$").expect("static IRC line regex")
});

/// Numerics that arrive during registration and carry nothing we act on.
pub const BANNER_NUMERICS: &[&str] = &[
    "002", "003", "004", "005", "250", "251", "252", "253", "254", "255", "265", "266", "333",
    "353", "366",
];

/// One decoded server line. The prefix keeps its leading `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub prefix: Option<String>,
    pub command: String,
    pub params: String,
}

impl Line {
    /// Split a raw line (without CRLF). Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Line> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let caps = LINE_RE.captures(raw)?;
        Some(Line {
            prefix: caps.get(1).map(|m| m.as_str().to_string()),
            command: caps.get(2)?.as_str().to_string(),
            params: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
    }

    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn kind(&self) -> Kind {
        match self.command.as_str() {
            "001" => Kind::Welcome,
            "433" => Kind::NickInUse,
            "442" => Kind::NotOnChannel,
            "JOIN" => Kind::Join,
            "PING" => Kind::Ping,
            code if BANNER_NUMERICS.contains(&code) => Kind::Banner,
            _ if self.is_numeric() => Kind::OtherNumeric,
            _ => Kind::Other,
        }
    }

    /// True when a JOIN broadcast is about `nick` entering `channel`.
    pub fn is_join_of(&self, nick: &str, channel: &str) -> bool {
        let nick_match = self
            .prefix
            .as_deref()
            .and_then(|p| p.strip_prefix(':'))
            .and_then(|p| p.strip_prefix(nick))
            .is_some_and(|rest| rest.starts_with('!'));
        let target = self.params.trim_start_matches(':');
        let chan_match = target.split_whitespace().next() == Some(channel);
        nick_match && chan_match
    }

    /// True when a 442 reply says `nick` is not on `channel`.
    pub fn is_not_on_channel(&self, nick: &str, channel: &str) -> bool {
        let mut words = self.params.split_whitespace();
        words.next() == Some(nick) && words.next() == Some(channel)
    }
}

/// Dispatch classes for inbound lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Welcome,
    Banner,
    NickInUse,
    NotOnChannel,
    Join,
    Ping,
    OtherNumeric,
    Other,
}

/// Commands the relay ever sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Nick(String),
    User(String),
    Join(String),
    Topic { channel: String, text: String },
    Pong(String),
}

impl Outbound {
    /// Short name used in logs and handshake errors.
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::Nick(_) => "NICK",
            Outbound::User(_) => "USER",
            Outbound::Join(_) => "JOIN",
            Outbound::Topic { .. } => "TOPIC",
            Outbound::Pong(_) => "PONG",
        }
    }

    /// Wire form including the CRLF terminator.
    pub fn to_wire(&self) -> String {
        format!("{self}\r\n")
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Nick(nick) => write!(f, "NICK {nick}"),
            Outbound::User(nick) => write!(f, "USER {nick} 0 * :{nick}"),
            Outbound::Join(channel) => write!(f, "JOIN {channel}"),
            // CR/LF inside the text would smuggle extra commands onto the wire.
            Outbound::Topic { channel, text } => {
                write!(f, "TOPIC {channel} :{}", text.replace(['\r', '\n'], " "))
            }
            Outbound::Pong(token) => write!(f, "PONG {token}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_prefix_command_params() {
        let line = Line::parse(":irc.example.net 001 hub :Welcome to the net\r\n").unwrap();
        assert_eq!(line.prefix.as_deref(), Some(":irc.example.net"));
        assert_eq!(line.command, "001");
        assert_eq!(line.params, "hub :Welcome to the net");
        assert_eq!(line.kind(), Kind::Welcome);
    }

    #[test]
    fn prefix_is_optional() {
        let line = Line::parse("PING :abc").unwrap();
        assert_eq!(line.prefix, None);
        assert_eq!(line.command, "PING");
        assert_eq!(line.params, ":abc");
        assert_eq!(line.kind(), Kind::Ping);
    }

    #[test]
    fn blank_line_does_not_parse() {
        assert_eq!(Line::parse(""), None);
        assert_eq!(Line::parse("\r\n"), None);
    }

    #[test]
    fn classifies_numerics() {
        assert_eq!(Line::parse(":s 004 hub x").unwrap().kind(), Kind::Banner);
        assert_eq!(Line::parse(":s 366 hub #c :End").unwrap().kind(), Kind::Banner);
        assert_eq!(Line::parse(":s 433 * hub :in use").unwrap().kind(), Kind::NickInUse);
        assert_eq!(Line::parse(":s 442 hub #c :not on").unwrap().kind(), Kind::NotOnChannel);
        assert_eq!(Line::parse(":s 372 hub :- motd").unwrap().kind(), Kind::OtherNumeric);
        assert_eq!(Line::parse(":n!u@h PRIVMSG #c :hi").unwrap().kind(), Kind::Other);
    }

    #[test]
    fn join_requires_our_nick_and_channel() {
        let ours = Line::parse(":hub!~hub@host JOIN :#sensors").unwrap();
        assert!(ours.is_join_of("hub", "#sensors"));
        assert!(!ours.is_join_of("hub", "#other"));

        let bare = Line::parse(":hub!~hub@host JOIN #sensors").unwrap();
        assert!(bare.is_join_of("hub", "#sensors"));

        let someone = Line::parse(":hubby!~x@host JOIN :#sensors").unwrap();
        assert!(!someone.is_join_of("hub", "#sensors"));

        let longer = Line::parse(":hub!~hub@host JOIN :#sensors2").unwrap();
        assert!(!longer.is_join_of("hub", "#sensors"));
    }

    #[test]
    fn not_on_channel_matches_nick_then_channel() {
        let line = Line::parse(":s 442 hub #sensors :You're not on that channel").unwrap();
        assert!(line.is_not_on_channel("hub", "#sensors"));
        assert!(!line.is_not_on_channel("hub", "#other"));
        assert!(!line.is_not_on_channel("bot", "#sensors"));
    }

    #[test]
    fn outbound_wire_format() {
        assert_eq!(Outbound::Nick("hub".into()).to_wire(), "NICK hub\r\n");
        assert_eq!(Outbound::User("hub".into()).to_wire(), "USER hub 0 * :hub\r\n");
        assert_eq!(Outbound::Join("#s".into()).to_wire(), "JOIN #s\r\n");
        assert_eq!(Outbound::Pong(":abc".into()).to_wire(), "PONG :abc\r\n");
        let topic = Outbound::Topic { channel: "#s".into(), text: "!pre a\r\nQUIT".into() };
        assert_eq!(topic.to_wire(), "TOPIC #s :!pre a  QUIT\r\n");
    }
}
