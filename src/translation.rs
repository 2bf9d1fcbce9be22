// Copyright 2025 Cornell University
// released under MIT License

use rustc_hash::FxHashMap;

use crate::errors::{ProtocolError, ProtocolResult};

/// Renames channels between the wire and a node's protocol.
/// Written as comma separated `in:<wire>:<local>` and `out:<local>:<wire>`
/// entries, e.g. `in:camera:image,out:image:filtered`.
/// Channels without an entry keep their name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelTranslation {
    /// wire name -> local name
    inbound: FxHashMap<String, String>,
    /// local name -> wire name
    outbound: FxHashMap<String, String>,
}

impl ChannelTranslation {
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let mut translation = Self::default();
        for entry in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let bad = |reason: &str| ProtocolError::BadTranslation {
                entry: entry.to_string(),
                reason: reason.to_string(),
            };
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [dir, from, to] = parts[..] else {
                return Err(bad("expected `in:<wire>:<local>` or `out:<local>:<wire>`"));
            };
            if from.is_empty() || to.is_empty() {
                return Err(bad("channel names must not be empty"));
            }
            let table = match dir {
                "in" => &mut translation.inbound,
                "out" => &mut translation.outbound,
                _ => return Err(bad("direction must be `in` or `out`")),
            };
            if table.insert(from.to_string(), to.to_string()).is_some() {
                return Err(bad("channel is translated more than once"));
            }
        }
        Ok(translation)
    }

    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty() && self.outbound.is_empty()
    }

    /// Local name for a topic received on the wire
    pub fn inbound<'a>(&'a self, wire: &'a str) -> &'a str {
        self.inbound.get(wire).map_or(wire, |local| local.as_str())
    }

    /// Wire topic for an output channel of the protocol
    pub fn outbound<'a>(&'a self, local: &'a str) -> &'a str {
        self.outbound.get(local).map_or(local, |wire| wire.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_in_both_directions() {
        let t = ChannelTranslation::parse("in:camera:image, out:image:filtered").unwrap();
        assert_eq!(t.inbound("camera"), "image");
        assert_eq!(t.inbound("episode_start"), "episode_start");
        assert_eq!(t.outbound("image"), "filtered");
        assert_eq!(t.outbound("episode_start"), "episode_start");
    }

    #[test]
    fn empty_text_is_identity() {
        let t = ChannelTranslation::parse("").unwrap();
        assert!(t.is_empty());
        assert_eq!(t.inbound("x"), "x");
        assert_eq!(ChannelTranslation::parse(" , ").unwrap(), t);
    }

    #[test]
    fn malformed_entries() {
        for bad in [
            "in:camera",
            "in:a:b:c",
            "sideways:a:b",
            "in::b",
            "in:a:b,in:a:c",
            "out:a:b,out:a:c",
        ] {
            let err = ChannelTranslation::parse(bad).unwrap_err();
            assert!(
                matches!(err, ProtocolError::BadTranslation { .. }),
                "{bad}: {err}"
            );
        }
    }
}
