//! Topic text for the relay, in the `!pre` layout understood by the
//! channel's display bot: `/` starts a new display line.
//!
//! `!pre /63 368 63 86/  1  Nov16 23:43/66 376 66 93/  2  Nov17 23:43`

use chrono::{DateTime, Local, Utc};

use crate::history::{NodeHistories, NodeHistory};

pub const SUMMARY_PREFIX: &str = "!pre ";

/// Placeholder for a slot whose node has not reported yet.
pub const EMPTY_SLOT: &str = "/--/--";

pub const DEFAULT_SLOTS: [&str; 2] = ["1", "2"];

/// `Nov16 23:43` in the hub's local time zone.
pub fn last_seen_label(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%b%d %H:%M").to_string()
}

fn format_slot(node: &str, history: &NodeHistory) -> Option<String> {
    let last = history.latest()?;
    let centivolts = (100.0 * last.battery_v).round();
    Some(format!(
        "/{:.0} {:.0} {:.0} {:.0}/  {}  {}",
        last.temp_f,
        centivolts,
        history.min_temp_f(),
        history.max_temp_f(),
        node,
        last_seen_label(last.timestamp),
    ))
}

/// One summary covering `slots`, in order.
pub fn format_summary<S: AsRef<str>>(histories: &NodeHistories, slots: &[S]) -> String {
    let mut out = String::from(SUMMARY_PREFIX);
    for node in slots {
        let node = node.as_ref();
        match histories.get(node).and_then(|h| format_slot(node, h)) {
            Some(slot) => out.push_str(&slot),
            None => out.push_str(EMPTY_SLOT),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_nodes() {
        let now = Utc::now();
        let mut all = NodeHistories::new();
        all.entry("1").add_at(now, 3.80, 63.0, now);
        all.entry("2").add_at(now, 3.89, 67.0, now);
        let label = last_seen_label(now);
        assert_eq!(
            format_summary(&all, &DEFAULT_SLOTS),
            format!("!pre /63 380 63 63/  1  {label}/67 389 67 67/  2  {label}")
        );
    }

    #[test]
    fn missing_nodes_use_placeholder() {
        let now = Utc::now();
        let mut all = NodeHistories::new();
        all.entry("2").add_at(now, 3.75, 70.4, now);
        let label = last_seen_label(now);
        assert_eq!(
            format_summary(&all, &DEFAULT_SLOTS),
            format!("!pre /--/--/70 375 70 70/  2  {label}")
        );
        assert_eq!(format_summary(&NodeHistories::new(), &["1", "2", "3"]), "!pre /--/--/--/--/--/--");
    }

    #[test]
    fn min_and_max_come_from_the_window() {
        let now = Utc::now();
        let mut all = NodeHistories::new();
        let h = all.entry("1");
        h.add_at(now - chrono::TimeDelta::hours(5), 3.9, 55.0, now);
        h.add_at(now - chrono::TimeDelta::hours(3), 3.9, 81.0, now);
        h.add_at(now, 3.8, 66.0, now);
        let summary = format_summary(&all, &["1"]);
        assert!(summary.starts_with("!pre /66 380 55 81/  1  "), "{summary}");
    }

    #[test]
    fn label_has_month_day_and_clock() {
        let label = last_seen_label(Utc::now());
        let re = regex::Regex::new(r"^[A-Z][a-z]{2}\d{2} \d{2}:\d{2}$").unwrap();
        assert!(re.is_match(&label), "{label}");
    }
}
