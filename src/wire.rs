// Copyright 2025 Cornell University
// released under MIT License

//! Line-delimited JSON messages exchanged between pipeline nodes.
//! Every line holds one object `{"topic": .., "data": .., "timing": ..}`.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, ProtocolResult};

/// Topics with this prefix are addressed to the wrapper, not to the node
pub const WRAPPER_PREFIX: &str = "wrapper.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub s: i64,
    pub us: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpec {
    pub time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time2: Option<Timestamp>,
    pub frame: String,
    pub clock: String,
}

/// When a message was acquired, processed and received, keyed by hop name.
/// Carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired: Option<BTreeMap<String, TimeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<BTreeMap<String, TimeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<TimeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingInfo>,
}

impl Message {
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
            timing: None,
        }
    }
}

/// Reads messages one line at a time. Blank lines are skipped and the
/// iterator ends at end of file.
pub struct MessageReader<R> {
    reader: R,
    line: String,
    lineno: usize,
}

impl<R: BufRead> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            lineno: 0,
        }
    }

    /// 1-based number of the last line read
    pub fn lineno(&self) -> usize {
        self.lineno
    }
}

impl<R: BufRead> Iterator for MessageReader<R> {
    type Item = ProtocolResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.lineno += 1;
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            return Some(serde_json::from_str(line).map_err(ProtocolError::from));
        }
    }
}

/// Writes `msg` as one line and flushes, so that a reader on the other end
/// of a pipe sees it right away.
pub fn write_message<W: Write + ?Sized>(out: &mut W, msg: &Message) -> ProtocolResult<()> {
    serde_json::to_writer(&mut *out, msg)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Out-of-band instructions for the wrapper
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    SetConfig { key: String, value: Value },
    /// a control topic this wrapper does not understand
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Control(Control),
    Channel(Message),
}

#[derive(Deserialize)]
struct SetConfig {
    key: String,
    value: Value,
}

impl Incoming {
    pub fn classify(msg: Message) -> ProtocolResult<Incoming> {
        if !msg.topic.starts_with(WRAPPER_PREFIX) {
            return Ok(Incoming::Channel(msg));
        }
        let control = match &msg.topic[WRAPPER_PREFIX.len()..] {
            "set_config" => {
                let SetConfig { key, value } = serde_json::from_value(msg.data)?;
                Control::SetConfig { key, value }
            }
            other => Control::Unknown(other.to_string()),
        };
        Ok(Incoming::Control(control))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_lines_and_skips_blanks() {
        let input = "{\"topic\": \"next_episode\", \"data\": null}\n\n   \n{\"topic\": \"next_image\"}\n";
        let msgs: Vec<Message> = MessageReader::new(input.as_bytes())
            .collect::<ProtocolResult<_>>()
            .unwrap();
        assert_eq!(
            msgs,
            vec![
                Message::new("next_episode", Value::Null),
                Message::new("next_image", Value::Null),
            ]
        );
    }

    #[test]
    fn last_line_without_newline() {
        let mut reader = MessageReader::new("{\"topic\": \"a\", \"data\": 1}".as_bytes());
        assert_eq!(reader.next().unwrap().unwrap().data, json!(1));
        assert!(reader.next().is_none());
        assert_eq!(reader.lineno(), 1);
    }

    #[test]
    fn malformed_lines_are_errors() {
        let mut reader = MessageReader::new("{\"topic\": \"a\"}\nnot json\n".as_bytes());
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next().unwrap(),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert_eq!(reader.lineno(), 2);
    }

    #[test]
    fn writes_one_line_per_message() {
        let mut out = vec![];
        write_message(&mut out, &Message::new("image", json!({"shape": [2, 3]}))).unwrap();
        write_message(&mut out, &Message::new("no_more_images", Value::Null)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"topic\":\"image\",\"data\":{\"shape\":[2,3]}}\n{\"topic\":\"no_more_images\",\"data\":null}\n"
        );
    }

    #[test]
    fn timing_is_carried() {
        let line = json!({
            "topic": "image",
            "data": null,
            "timing": {
                "acquired": {
                    "camera": {"time": {"s": 10, "us": 5}, "frame": "robot", "clock": "host"}
                },
                "received": {
                    "time": {"s": 11, "us": 0},
                    "time2": {"s": 11, "us": 7},
                    "frame": "robot",
                    "clock": "host"
                }
            }
        });
        let msg: Message = serde_json::from_value(line.clone()).unwrap();
        let timing = msg.timing.as_ref().unwrap();
        assert_eq!(timing.acquired.as_ref().unwrap()["camera"].time.s, 10);
        assert_eq!(timing.received.as_ref().unwrap().time2, Some(Timestamp { s: 11, us: 7 }));
        assert!(timing.processed.is_none());
        assert_eq!(serde_json::to_value(&msg).unwrap(), line);
    }

    #[test]
    fn control_topics() {
        let msg = Message::new("wrapper.set_config", json!({"key": "num_episodes", "value": 3}));
        assert_eq!(
            Incoming::classify(msg).unwrap(),
            Incoming::Control(Control::SetConfig {
                key: "num_episodes".to_string(),
                value: json!(3)
            })
        );

        let msg = Message::new("wrapper.ping", Value::Null);
        assert_eq!(
            Incoming::classify(msg).unwrap(),
            Incoming::Control(Control::Unknown("ping".to_string()))
        );

        let msg = Message::new("wrapper.set_config", json!({"value": 3}));
        assert!(Incoming::classify(msg).is_err());

        let msg = Message::new("image", Value::Null);
        assert_eq!(Incoming::classify(msg.clone()).unwrap(), Incoming::Channel(msg));
    }
}
