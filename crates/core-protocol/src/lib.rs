//! Wire data model shared by the page side and the socket side.
//!
//! Everything the companion server sees travels as one JSON document per
//! WebSocket text frame (no length prefix): a [`ChangeRecord`] in either
//! direction. The discovery probe that precedes the socket returns a
//! [`ServerInfo`] body with PascalCase field names; its `ProtocolVersion`
//! must equal [`PROTOCOL_VERSION`] or no socket is opened at all.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version of the change-frame protocol this client speaks. Compared
/// verbatim against `ServerInfo::protocol_version` during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Decode/encode failures for wire frames and probe bodies.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed change frame: {0}")]
    Frame(#[from] serde_json::Error),
}

/// One selected span of the surface's flattened text. Offsets are character
/// offsets from the start of the text; `start == end` denotes a caret.
/// `start <= end` is expected but not enforced by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

impl SelectionRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A degenerate range: caret at `offset`.
    pub fn caret(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn is_caret(&self) -> bool {
        self.start == self.end
    }
}

/// Ordered collection of selection ranges.
///
/// Order carries no meaning but insertion order is preserved so encoding is
/// stable. Invariant: a set serialized for a bound surface is never empty;
/// surfaces with no native selection concept report [`SelectionSet::placeholder`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet {
    ranges: Vec<SelectionRange>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single caret-at-origin placeholder reported by surfaces that
    /// cannot observe their own selection.
    pub fn placeholder() -> Self {
        Self {
            ranges: vec![SelectionRange::default()],
        }
    }

    pub fn single(range: SelectionRange) -> Self {
        Self {
            ranges: vec![range],
        }
    }

    pub fn add(&mut self, range: SelectionRange) {
        self.ranges.push(range);
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SelectionRange> {
        self.ranges.iter()
    }

    /// Collapse to one contiguous range: minimum of all starts, maximum of
    /// all ends, independent of insertion order. Consumers that support only
    /// a single selection apply this reduction. An empty set reduces to the
    /// default caret rather than sentinel garbage.
    pub fn min_max(&self) -> SelectionRange {
        let mut iter = self.ranges.iter();
        let Some(first) = iter.next() else {
            return SelectionRange::default();
        };
        let mut out = *first;
        for range in iter {
            out.start = out.start.min(range.start);
            out.end = out.end.max(range.end);
        }
        out
    }
}

impl From<Vec<SelectionRange>> for SelectionSet {
    fn from(ranges: Vec<SelectionRange>) -> Self {
        Self { ranges }
    }
}

impl FromIterator<SelectionRange> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = SelectionRange>>(iter: I) -> Self {
        Self {
            ranges: iter.into_iter().collect(),
        }
    }
}

/// The unit of editing state exchanged with the external server.
///
/// Produced fresh on every local edit, consumed on every remote push, never
/// mutated after serialization. `url` carries the host component only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub title: String,
    pub text: String,
    pub selections: SelectionSet,
    pub url: String,
    pub syntax: Option<String>,
}

impl ChangeRecord {
    /// Encode as one JSON text frame.
    pub fn to_frame(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a received text frame.
    pub fn from_frame(frame: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// Body of the local discovery probe response (`GET http://localhost:<port>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    pub protocol_version: u32,
    pub web_socket_port: u16,
}

impl ServerInfo {
    pub fn parse(body: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_spans_all_ranges() {
        let set: SelectionSet = vec![
            SelectionRange::new(10, 14),
            SelectionRange::new(2, 5),
            SelectionRange::new(7, 30),
        ]
        .into();
        assert_eq!(set.min_max(), SelectionRange::new(2, 30));
    }

    #[test]
    fn min_max_is_order_independent() {
        let forward: SelectionSet = vec![
            SelectionRange::new(1, 2),
            SelectionRange::new(8, 9),
            SelectionRange::new(4, 4),
        ]
        .into();
        let reversed: SelectionSet = forward.iter().copied().rev().collect();
        assert_eq!(forward.min_max(), reversed.min_max());
        assert_eq!(forward.min_max(), SelectionRange::new(1, 9));
    }

    #[test]
    fn min_max_of_empty_set_is_default_caret() {
        assert_eq!(SelectionSet::new().min_max(), SelectionRange::default());
    }

    #[test]
    fn placeholder_is_never_empty() {
        let set = SelectionSet::placeholder();
        assert_eq!(set.len(), 1);
        assert!(set.iter().next().unwrap().is_caret());
    }

    #[test]
    fn change_record_frame_shape() {
        let record = ChangeRecord {
            title: "T".into(),
            text: "hi".into(),
            selections: SelectionSet::single(SelectionRange::caret(2)),
            url: "example.com".into(),
            syntax: None,
        };
        let frame = record.to_frame().unwrap();
        assert_eq!(
            frame,
            r#"{"title":"T","text":"hi","selections":[{"start":2,"end":2}],"url":"example.com","syntax":null}"#
        );
    }

    #[test]
    fn change_record_round_trip() {
        let record = ChangeRecord {
            title: "notes".into(),
            text: "alpha\nbeta".into(),
            selections: vec![SelectionRange::new(0, 5), SelectionRange::new(6, 10)].into(),
            url: "example.com".into(),
            syntax: Some("markdown".into()),
        };
        let decoded = ChangeRecord::from_frame(&record.to_frame().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn server_info_parses_pascal_case_body() {
        let info = ServerInfo::parse(r#"{"ProtocolVersion":1,"WebSocketPort":5000}"#).unwrap();
        assert_eq!(info.protocol_version, 1);
        assert_eq!(info.web_socket_port, 5000);
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(ChangeRecord::from_frame("{\"title\":").is_err());
    }
}
