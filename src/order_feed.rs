//! Reading the host's order feed.
//!
//! The host appends one record per line, written as near-JSON:
//!
//! ```text
//! 12:04:55 {Action: Assign, GameID: 2, PlayerID: 7}
//! ```
//!
//! > ⚠️ This feed is manually scanned and supports only flat `key: value` pairs. Everything
//! > between the first `{` and the last `}` of a line is split on `,`, then each pair on its
//! > first `:`. Quotes are kept as part of keys and values, and a value containing a `,` or a
//! > `:` is mis-split. This leniency is what the host relies on, so it is kept as is.
//!
//! Only the last record of the feed matters: there are no sequence numbers and no history.

use std::{collections::HashMap, fmt::Display, path::Path};

use tracing::{instrument, trace};

/// Value of a single field of an [`OrderRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderValue {
    /// Values made only of ASCII digits
    Int(i64),
    /// Everything else, verbatim
    Text(String),
}

impl OrderValue {
    fn parse(raw: &str) -> OrderValue {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse() {
                return OrderValue::Int(n);
            }
        }
        OrderValue::Text(raw.to_string())
    }

    /// The integer, if this value is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            OrderValue::Int(n) => Some(*n),
            OrderValue::Text(_) => None,
        }
    }

    /// True if the textual form of this value is `text`.
    pub fn is(&self, text: &str) -> bool {
        match self {
            OrderValue::Text(s) => s == text,
            OrderValue::Int(n) => n.to_string() == text,
        }
    }
}

impl Display for OrderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderValue::Int(n) => write!(f, "{n}"),
            OrderValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One command published by the host. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    fields: HashMap<String, OrderValue>,
}

impl OrderRecord {
    /// Raw access to any field.
    pub fn get(&self, key: &str) -> Option<&OrderValue> {
        self.fields.get(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false for parsed records.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True if the `Action` field is `action`.
    pub fn is_action(&self, action: &str) -> bool {
        self.get("Action").is_some_and(|a| a.is(action))
    }

    /// True if the `PlayerID` field designates `player_id`, compared as text.
    pub fn is_for(&self, player_id: &str) -> bool {
        self.get("PlayerID").is_some_and(|p| p.is(player_id))
    }

    /// The `stage` field, or `game_stage` when `stage` is absent or empty.
    pub fn stage(&self) -> Option<String> {
        match self.get("stage") {
            Some(OrderValue::Text(s)) if s.is_empty() => {}
            Some(stage) => return Some(stage.to_string()),
            None => {}
        }
        self.get("game_stage").map(OrderValue::to_string)
    }
}

/// Extract the record of a single line, if any.
pub fn parse_line(line: &str) -> Option<OrderRecord> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    if end <= start {
        return None;
    }

    let mut fields = HashMap::new();
    for pair in line[start + 1..end].split(',') {
        let Some((key, value)) = pair.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        fields.insert(key.to_string(), OrderValue::parse(value.trim()));
    }

    if fields.is_empty() {
        None
    } else {
        Some(OrderRecord { fields })
    }
}

/// The last record found in `feed`, ignoring lines that hold none.
pub fn parse_feed_str(feed: &str) -> Option<OrderRecord> {
    feed.lines().filter_map(parse_line).last()
}

/// The last record of the mirror file at `path`. A missing or unreadable file holds no record.
#[instrument]
pub fn parse_feed(path: &Path) -> Option<OrderRecord> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            trace!("no feed mirror: {e}");
            return None;
        }
    };
    let record = parse_feed_str(&String::from_utf8_lossy(&bytes));
    trace!(?record);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_words_and_integers() {
        let record = parse_line("{Action: Assign, GameID: 2, PlayerID: 7}").unwrap();
        assert_eq!(record.len(), 3);
        assert!(record.is_action("Assign"));
        assert_eq!(record.get("GameID"), Some(&OrderValue::Int(2)));
        assert!(record.is_for("7"));
        assert!(!record.is_for("07"));
    }

    #[test]
    fn text_around_braces_is_ignored() {
        let record = parse_line("2024-05-01 12:00:00 INFO {stage: Final} trailing").unwrap();
        assert_eq!(record.stage().as_deref(), Some("Final"));
    }

    #[test]
    fn lines_without_braces_are_skipped() {
        assert_eq!(parse_line("Action: Assign"), None);
        assert_eq!(parse_line("{Action: Assign"), None);
        assert_eq!(parse_line("Action: Assign}"), None);
        assert_eq!(parse_line("} Action: Assign {"), None);
    }

    #[test]
    fn empty_records_are_discarded() {
        assert_eq!(parse_line("{}"), None);
        assert_eq!(parse_line("{no pairs here, nor here}"), None);
        assert_eq!(parse_line("{: orphan}"), None);
    }

    #[test]
    fn quotes_are_kept() {
        let record = parse_line(r#"{"Action": "Assign", "GameID": 3}"#).unwrap();
        assert!(!record.is_action("Assign"));
        assert!(record.get("\"Action\"").is_some_and(|a| a.is("\"Assign\"")));
        assert_eq!(record.get("\"GameID\""), Some(&OrderValue::Int(3)));
    }

    #[test]
    fn value_is_split_on_first_colon_only() {
        let record = parse_line("{time: 12:30:00, Value: 5}").unwrap();
        assert_eq!(
            record.get("time"),
            Some(&OrderValue::Text("12:30:00".to_string()))
        );
        assert_eq!(record.get("Value"), Some(&OrderValue::Int(5)));
    }

    #[test]
    fn non_digit_values_stay_text() {
        let record = parse_line("{Value: -5, Other: 1.5, Big: 99999999999999999999}").unwrap();
        assert_eq!(record.get("Value"), Some(&OrderValue::Text("-5".into())));
        assert_eq!(record.get("Other"), Some(&OrderValue::Text("1.5".into())));
        assert_eq!(
            record.get("Big"),
            Some(&OrderValue::Text("99999999999999999999".into()))
        );
    }

    #[test]
    fn last_record_wins() {
        let feed = "{Action: Accepted, PlayerID: 7}\n\
                    garbage line\n\
                    {Action: Assign, GameID: 1}\n\
                    {Action: Assign, GameID: 4}\n\
                    {}\n\
                    not a record either\n";
        let record = parse_feed_str(feed).unwrap();
        assert_eq!(record.get("GameID"), Some(&OrderValue::Int(4)));
    }

    #[test]
    fn feed_without_records() {
        assert_eq!(parse_feed_str(""), None);
        assert_eq!(parse_feed_str("hello\n{}\nworld: 3\n"), None);
    }

    #[test]
    fn missing_mirror_has_no_record() {
        let path = std::env::temp_dir().join("minigame-client-missing-mirror.log");
        let _ = std::fs::remove_file(&path);
        assert_eq!(parse_feed(&path), None);
    }

    #[test]
    fn mirror_file_is_read() {
        let path = std::env::temp_dir().join(format!(
            "minigame-client-mirror-{}.log",
            std::process::id()
        ));
        std::fs::write(&path, "{Action: Sabotage, Effect: Delay, Value: 3}\n").unwrap();
        let record = parse_feed(&path).unwrap();
        assert!(record.is_action("Sabotage"));
        assert_eq!(record.get("Value").and_then(OrderValue::as_int), Some(3));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stage_falls_back_to_game_stage() {
        let record = parse_line("{game_stage: Final}").unwrap();
        assert_eq!(record.stage().as_deref(), Some("Final"));
        let record = parse_line("{stage: , game_stage: Final}").unwrap();
        assert_eq!(record.stage().as_deref(), Some("Final"));
        let record = parse_line("{stage: R2, game_stage: Final}").unwrap();
        assert_eq!(record.stage().as_deref(), Some("R2"));
        let record = parse_line("{Action: Assign}").unwrap();
        assert_eq!(record.stage(), None);
    }
}
