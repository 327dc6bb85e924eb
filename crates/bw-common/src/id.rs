//! Line, stop, bus and bus-group identity types.
//!
//! A bus group is the ordered set of `d + 1` buses spanned by a headway
//! window of dimension `d`. It is stored as a fixed 9-slot array padded
//! with the zero sentinel, which makes it usable directly as a map key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest window dimension a model may be trained for.
pub const MAX_DIM: usize = 8;

/// Slots in a [`BusGroupKey`] (`MAX_DIM + 1` buses).
pub const GROUP_SLOTS: usize = MAX_DIM + 1;

/// Transit line identifier as published by the operator (e.g. `"1"`, `"44"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub String);

impl LineId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineId {
    fn from(s: &str) -> Self {
        LineId(s.to_string())
    }
}

impl From<String> for LineId {
    fn from(s: String) -> Self {
        LineId(s)
    }
}

/// Stop code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopId(pub u32);

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StopId {
    fn from(id: u32) -> Self {
        StopId(id)
    }
}

/// Vehicle number. `0` is reserved as the "no bus" sentinel.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BusId(pub u32);

impl BusId {
    pub const NONE: BusId = BusId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BusId {
    fn from(id: u32) -> Self {
        BusId(id)
    }
}

/// Travel direction of a line. Serialized as `1` / `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    Outbound = 1,
    Inbound = 2,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Outbound, Direction::Inbound];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Direction::Outbound),
            2 => Ok(Direction::Inbound),
            other => Err(format!("direction must be 1 or 2, got {other}")),
        }
    }
}

impl From<Direction> for u8 {
    fn from(d: Direction) -> u8 {
        d.as_u8()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Why a bus list cannot form a [`BusGroupKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("a bus group needs between 2 and {GROUP_SLOTS} buses, got {0}")]
    Arity(usize),

    #[error("bus group contains the reserved id 0")]
    Sentinel,

    #[error("bus {0} appears more than once in the group")]
    Duplicate(BusId),
}

/// Ordered, zero-padded identity of a bus group.
///
/// Invariant: the first `dimension() + 1` slots hold distinct non-zero bus
/// ids in chain order; every remaining slot is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct BusGroupKey([BusId; GROUP_SLOTS]);

impl BusGroupKey {
    pub fn from_buses(buses: &[BusId]) -> Result<Self, KeyError> {
        if buses.len() < 2 || buses.len() > GROUP_SLOTS {
            return Err(KeyError::Arity(buses.len()));
        }
        let mut slots = [BusId::NONE; GROUP_SLOTS];
        for (i, &bus) in buses.iter().enumerate() {
            if bus.is_none() {
                return Err(KeyError::Sentinel);
            }
            if buses[..i].contains(&bus) {
                return Err(KeyError::Duplicate(bus));
            }
            slots[i] = bus;
        }
        Ok(BusGroupKey(slots))
    }

    /// Number of headways the group spans.
    pub fn dimension(&self) -> usize {
        self.buses().len() - 1
    }

    /// The non-padding bus ids, in chain order.
    pub fn buses(&self) -> &[BusId] {
        let n = self.0.iter().take_while(|b| !b.is_none()).count();
        &self.0[..n]
    }

    /// All 9 slots, padding included.
    pub fn slots(&self) -> &[BusId; GROUP_SLOTS] {
        &self.0
    }
}

impl TryFrom<Vec<u32>> for BusGroupKey {
    type Error = KeyError;

    /// Accepts either the bare bus list or the full zero-padded form.
    fn try_from(raw: Vec<u32>) -> Result<Self, Self::Error> {
        if raw.len() > GROUP_SLOTS {
            return Err(KeyError::Arity(raw.len()));
        }
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let buses: Vec<BusId> = raw[..end].iter().copied().map(BusId).collect();
        BusGroupKey::from_buses(&buses)
    }
}

impl From<BusGroupKey> for Vec<u32> {
    fn from(key: BusGroupKey) -> Vec<u32> {
        key.0.iter().map(|b| b.0).collect()
    }
}

impl fmt::Display for BusGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, bus) in self.buses().iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{bus}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buses(ids: &[u32]) -> Vec<BusId> {
        ids.iter().copied().map(BusId).collect()
    }

    #[test]
    fn key_pads_and_reports_dimension() {
        let key = BusGroupKey::from_buses(&buses(&[402, 417, 455])).unwrap();
        assert_eq!(key.dimension(), 2);
        assert_eq!(key.buses(), buses(&[402, 417, 455]).as_slice());
        assert_eq!(key.slots()[3..], [BusId::NONE; 6]);
        assert_eq!(key.to_string(), "402-417-455");
    }

    #[test]
    fn key_order_matters() {
        let a = BusGroupKey::from_buses(&buses(&[1, 2])).unwrap();
        let b = BusGroupKey::from_buses(&buses(&[2, 1])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn key_rejects_bad_groups() {
        assert_eq!(BusGroupKey::from_buses(&buses(&[7])), Err(KeyError::Arity(1)));
        assert_eq!(
            BusGroupKey::from_buses(&buses(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])),
            Err(KeyError::Arity(10))
        );
        assert_eq!(BusGroupKey::from_buses(&buses(&[1, 0])), Err(KeyError::Sentinel));
        assert_eq!(
            BusGroupKey::from_buses(&buses(&[5, 6, 5])),
            Err(KeyError::Duplicate(BusId(5)))
        );
    }

    #[test]
    fn key_serde_accepts_padded_and_bare_forms() {
        let key = BusGroupKey::from_buses(&buses(&[10, 20])).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "[10,20,0,0,0,0,0,0,0]");
        let back: BusGroupKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        let bare: BusGroupKey = serde_json::from_str("[10,20]").unwrap();
        assert_eq!(bare, key);
        assert!(serde_json::from_str::<BusGroupKey>("[10,0,20]").is_err());
        assert!(serde_json::from_str::<BusGroupKey>("[]").is_err());
    }

    #[test]
    fn direction_serde_is_numeric() {
        assert_eq!(serde_json::to_string(&Direction::Inbound).unwrap(), "2");
        let d: Direction = serde_json::from_str("1").unwrap();
        assert_eq!(d, Direction::Outbound);
        assert!(serde_json::from_str::<Direction>("3").is_err());
        assert_eq!(Direction::Outbound.opposite(), Direction::Inbound);
    }
}
