//! Wire format of one sensor report as printed by the gateway board.
//!
//! ```text
//! LORA: -122, -14.0, 1, 38734ca6, 3.80, 63, DUP
//! ESPNOW: -63, 0.0, 2, 38734b3c, 3.80, 64, OK
//! ```
//!
//! Fields are `tag: rssi, snr, node, seq, battery_v, temp_f, flag`. Only the
//! battery and temperature are numeric; the rest are kept verbatim.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Tags that open a sensor report line.
pub const REPORT_TAGS: &[&str] = &["LORA", "ESPNOW"];

/// Flag value of a first-seen report. Anything else is a retransmission.
pub const ACCEPTED_FLAG: &str = "OK";

static REPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(ESPNOW|LORA):\s*",
        r"([^,]+),\s*", // rssi
        r"([^,]+),\s*", // snr
        r"([^,]+),\s*", // node
        r"([^,]+),\s*", // seq
        r"([^,]+),\s*", // battery
        r"([^,]+),\s*", // temperature
        r"([^,]+)",     // OK | DUP
    ))
    .expect("static report regex")
});

static REPORT_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(LORA|ESPNOW): ").expect("static report hint regex"));

/// Coarse filter applied on the serial side before anything is queued.
pub fn looks_like_report(line: &str) -> bool {
    REPORT_HINT_RE.is_match(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr, EnumString)]
pub enum Transport {
    #[strum(serialize = "LORA")]
    #[serde(rename = "LORA")]
    Lora,
    #[strum(serialize = "ESPNOW")]
    #[serde(rename = "ESPNOW")]
    EspNow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub transport: Transport,
    pub rssi: String,
    pub snr: String,
    pub node: String,
    /// Device counter, untrusted. Never compared.
    pub seq: String,
    pub battery_v: f64,
    pub temp_f: f64,
    pub duplicate: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("bad report format: {0}")]
    Format(String),

    #[error("bad battery voltage: {0}")]
    Battery(String),

    #[error("bad temperature F: {0}")]
    Temperature(String),
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl SensorRecord {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let caps = REPORT_RE
            .captures(line)
            .ok_or_else(|| ParseError::Format(line.to_string()))?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str().trim()).unwrap_or_default();

        let transport = Transport::from_str(field(1))
            .map_err(|_| ParseError::Format(line.to_string()))?;
        if field(4).is_empty() {
            return Err(ParseError::Format(line.to_string()));
        }
        let battery_v = parse_number(field(6)).ok_or_else(|| ParseError::Battery(field(6).to_string()))?;
        let temp_f =
            parse_number(field(7)).ok_or_else(|| ParseError::Temperature(field(7).to_string()))?;

        Ok(SensorRecord {
            transport,
            rssi: field(2).to_string(),
            snr: field(3).to_string(),
            node: field(4).to_string(),
            seq: field(5).to_string(),
            battery_v,
            temp_f,
            duplicate: field(8) != ACCEPTED_FLAG,
        })
    }
}

impl FromStr for SensorRecord {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorRecord::parse(s)
    }
}
