//! Event kinds eligible for webhook delivery.
//!
//! The wire strings are fixed — they appear in subscribe requests, in the
//! user store, and as the `type` field of outbound webhook payloads.
//! `All` subsumes every other kind.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Message,
    ReadReceipt,
    Presence,
    HistorySync,
    ChatPresence,
    All,
}

impl EventKind {
    pub const ALL_KINDS: [EventKind; 6] = [
        EventKind::Message,
        EventKind::ReadReceipt,
        EventKind::Presence,
        EventKind::HistorySync,
        EventKind::ChatPresence,
        EventKind::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "Message",
            EventKind::ReadReceipt => "ReadReceipt",
            EventKind::Presence => "Presence",
            EventKind::HistorySync => "HistorySync",
            EventKind::ChatPresence => "ChatPresence",
            EventKind::All => "All",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Message" => Ok(EventKind::Message),
            "ReadReceipt" => Ok(EventKind::ReadReceipt),
            "Presence" => Ok(EventKind::Presence),
            "HistorySync" => Ok(EventKind::HistorySync),
            "ChatPresence" => Ok(EventKind::ChatPresence),
            "All" => Ok(EventKind::All),
            _ => Err(()),
        }
    }
}

/// Resolve a raw subscribe list into the effective event set.
///
/// Subscription is best effort over the valid subset: unrecognized kinds
/// are dropped with a warning, duplicates collapse, and an empty result
/// (including an empty input) falls back to `{All}`.
pub fn parse_subscription(requested: &[String]) -> BTreeSet<EventKind> {
    let mut events = BTreeSet::new();
    for raw in requested {
        match raw.trim().parse::<EventKind>() {
            Ok(kind) => {
                events.insert(kind);
            }
            Err(()) => {
                tracing::warn!(kind = %raw, "unknown event kind discarded");
            }
        }
    }
    if events.is_empty() {
        events.insert(EventKind::All);
    }
    events
}

/// Render an event set as the comma-joined wire form stored per user.
pub fn join_events(events: &BTreeSet<EventKind>) -> String {
    events
        .iter()
        .map(EventKind::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the comma-joined stored form back into a set. Unknown segments
/// are ignored; an empty string yields the empty set (an unsubscribed user).
pub fn split_events(raw: &str) -> BTreeSet<EventKind> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<EventKind>().ok())
        .collect()
}

/// Delivery rule: a subscription matches a kind iff it holds the wildcard
/// or the kind itself.
pub fn subscription_matches(events: &BTreeSet<EventKind>, kind: EventKind) -> bool {
    events.contains(&EventKind::All) || events.contains(&kind)
}
