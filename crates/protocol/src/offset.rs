//! Offset encoding (spec §4.3, §6).
//!
//! An offset on the wire is two zero-padded 16-digit decimal integers joined
//! by `_`: the start offset of the segment (hot or rotated) that contains the
//! position, and the absolute offset itself. Keeping both halves — rather
//! than just the absolute value — means lexicographic string comparison
//! matches numeric offset ordering even across segment boundaries, and it
//! doubles as the response `ETag`.

use std::fmt;
use std::str::FromStr;

const DIGITS: usize = 16;

/// A resolved, encodable stream offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset {
    /// Start offset of the segment (hot or rotated) containing `value`.
    pub segment_start: u64,
    /// Absolute position within the stream: byte offset (binary content
    /// types) or message index (JSON content types).
    pub value: u64,
}

impl Offset {
    pub const ZERO: Offset = Offset {
        segment_start: 0,
        value: 0,
    };

    pub fn new(segment_start: u64, value: u64) -> Self {
        Self {
            segment_start,
            value,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{:0width$}_{:0width$}",
            self.segment_start,
            self.value,
            width = DIGITS
        )
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OffsetParseError {
    #[error("offset must be two {DIGITS}-digit decimal integers joined by '_'")]
    MalformedShape,
    #[error("offset half is not a valid decimal integer")]
    NotDecimal,
}

impl FromStr for Offset {
    type Err = OffsetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = s
            .split_once('_')
            .ok_or(OffsetParseError::MalformedShape)?;
        if lo.len() != DIGITS || hi.len() != DIGITS {
            return Err(OffsetParseError::MalformedShape);
        }
        let segment_start = lo.parse::<u64>().map_err(|_| OffsetParseError::NotDecimal)?;
        let value = hi.parse::<u64>().map_err(|_| OffsetParseError::NotDecimal)?;
        Ok(Offset {
            segment_start,
            value,
        })
    }
}

/// A client-supplied `offset` query parameter before resolution against a
/// stream's current state (spec §4.1 read algorithm step 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedOffset {
    /// `offset=-1`: start of the stream.
    Start,
    /// `offset=now`: current tail at the moment the handler runs.
    Tail,
    /// A literal encoded offset.
    Literal(Offset),
}

impl FromStr for RequestedOffset {
    type Err = OffsetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-1" => Ok(RequestedOffset::Start),
            "now" => Ok(RequestedOffset::Tail),
            other => Offset::from_str(other).map(RequestedOffset::Literal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_encodes_to_canonical_string() {
        assert_eq!(
            Offset::ZERO.encode(),
            "0000000000000000_0000000000000000"
        );
    }

    #[test]
    fn round_trips_through_string() {
        let original = Offset::new(12, 1234567890);
        let encoded = original.encode();
        let parsed: Offset = encoded.parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn scenario_one_hello_offset_matches_spec_example() {
        let tail = Offset::new(0, 5);
        assert_eq!(tail.encode(), "0000000000000000_0000000000000005");
    }

    #[test]
    fn lexicographic_order_matches_numeric_order_across_segments() {
        let a = Offset::new(0, 999);
        let b = Offset::new(1000, 1000);
        assert!(a.value < b.value);
        assert!(a.encode() < b.encode());
    }

    #[test]
    fn lexicographic_order_matches_numeric_order_within_one_segment() {
        let a = Offset::new(0, 5);
        let b = Offset::new(0, 6);
        assert!(a.encode() < b.encode());
    }

    #[test]
    fn rejects_wrong_width_halves() {
        assert!("1_2".parse::<Offset>().is_err());
        assert!("00000000000000001_0000000000000002".parse::<Offset>().is_err());
    }

    #[test]
    fn rejects_non_decimal_halves() {
        assert!("abcdefghijklmnop_0000000000000000"
            .parse::<Offset>()
            .is_err());
    }

    #[test]
    fn requested_offset_parses_sentinels_and_literals() {
        assert_eq!("-1".parse::<RequestedOffset>().unwrap(), RequestedOffset::Start);
        assert_eq!("now".parse::<RequestedOffset>().unwrap(), RequestedOffset::Tail);
        assert_eq!(
            "0000000000000000_0000000000000005"
                .parse::<RequestedOffset>()
                .unwrap(),
            RequestedOffset::Literal(Offset::new(0, 5))
        );
    }
}
