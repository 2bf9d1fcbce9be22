// Copyright 2025 Cornell University
// released under MIT License

use std::io::Write;

use serde_json::{json, Value};

use crate::automaton::EventMatcher;
use crate::checker::{LanguageChecker, Verdict};
use crate::errors::{ProtocolError, ProtocolResult};
use crate::ir::{Dir, Event};
use crate::protocol::InteractionProtocol;
use crate::translation::ChannelTranslation;
use crate::wire::{write_message, Message};

/// A pipeline node driven by the wrapper loop.
///
/// `handlers` is the node's capability table: every input channel of the
/// protocol it is bound to must appear there, which is checked once when
/// the node is bound. `on_received` is only ever called with channels from
/// that table.
pub trait Node {
    fn name(&self) -> &str;

    /// Input channels this node has a callback for
    fn handlers(&self) -> &[&str];

    fn init(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_received(
        &mut self,
        channel: &str,
        data: Value,
        ctx: &mut Context<'_>,
    ) -> anyhow::Result<()>;

    fn finish(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Current configuration, if the node has one
    fn config(&self) -> Option<Value> {
        None
    }

    fn set_config(&mut self, key: &str, _value: Value) -> ProtocolResult<()> {
        Err(ProtocolError::Config {
            key: key.to_string(),
            reason: format!("node `{}` has no configuration", self.name()),
        })
    }

    /// Called after every `wrapper.set_config` message, whether or not the
    /// key could be set
    fn on_updated_config(
        &mut self,
        _key: &str,
        _value: &Value,
        _ctx: &mut Context<'_>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fails with `MissingHandler` for the first input channel of `protocol`
/// that `node` cannot receive.
pub fn check_implementation(node: &dyn Node, protocol: &InteractionProtocol) -> ProtocolResult<()> {
    let handlers = node.handlers();
    for channel in protocol.inputs().keys() {
        if !handlers.contains(&channel.as_str()) {
            return Err(ProtocolError::MissingHandler {
                node: node.name().to_string(),
                channel: channel.clone(),
            });
        }
    }
    Ok(())
}

/// `{"name": .., "config": ..}` as printed by `describe-node`
pub fn describe_node(node: &dyn Node) -> Value {
    let mut description = json!({ "name": node.name() });
    if let Some(config) = node.config() {
        description["config"] = config;
    }
    description
}

/// Builds the `ProtocolViolation` for an event the checker refused.
/// `expected` is what the checker would have accepted instead.
pub fn violation(event: Event, reason: String, expected: &[EventMatcher]) -> ProtocolError {
    let reason = if expected.is_empty() {
        format!("{}; nothing more was expected", reason)
    } else {
        let expected: Vec<String> = expected.iter().map(|m| m.to_string()).collect();
        format!("{}; expected one of [{}]", reason, expected.join(", "))
    };
    ProtocolError::ProtocolViolation { event, reason }
}

/// What a node callback may do: produce outputs and log.
/// Outputs are checked against the protocol before anything is written.
pub struct Context<'a> {
    node: &'a str,
    protocol: &'a InteractionProtocol,
    checker: &'a mut LanguageChecker,
    out: &'a mut dyn Write,
    translation: &'a ChannelTranslation,
}

impl<'a> Context<'a> {
    pub fn new(
        node: &'a str,
        protocol: &'a InteractionProtocol,
        checker: &'a mut LanguageChecker,
        out: &'a mut dyn Write,
        translation: &'a ChannelTranslation,
    ) -> Self {
        Self {
            node,
            protocol,
            checker,
            out,
            translation,
        }
    }

    /// Sends `data` on output `channel`
    pub fn write(&mut self, channel: &str, data: Value) -> ProtocolResult<()> {
        self.protocol.resolve(Dir::Out, channel)?;
        let event = Event::new(Dir::Out, channel);
        let expected = self.checker.expected();
        if let Verdict::Unexpected(reason) = self.checker.push(&event) {
            return Err(violation(event, reason, &expected));
        }
        let topic = self.translation.outbound(channel);
        write_message(self.out, &Message::new(topic, data))
    }

    pub fn log(&self, msg: impl std::fmt::Display) {
        log::info!("{}: {}", self.node, msg);
    }
}
