// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::automaton::Automaton;
use crate::checker::LanguageChecker;
use crate::errors::{ProtocolError, ProtocolResult};
use crate::ir::{ChannelName, Dir, Language};
use crate::parser::parse_language;
use crate::static_checks::check_declared;

/// Name of the type carried on a channel, e.g. `JPGImage` or `None`.
/// Payloads themselves stay opaque.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadType(String);

impl PayloadType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed channel tables plus the language that orders events on them.
/// The automaton is compiled once on construction.
#[derive(Debug, Clone)]
pub struct InteractionProtocol {
    description: String,
    inputs: BTreeMap<ChannelName, PayloadType>,
    outputs: BTreeMap<ChannelName, PayloadType>,
    language: Language,
    automaton: Arc<Automaton>,
}

impl InteractionProtocol {
    pub fn new(
        description: impl Into<String>,
        inputs: BTreeMap<ChannelName, PayloadType>,
        outputs: BTreeMap<ChannelName, PayloadType>,
        language: Language,
    ) -> ProtocolResult<Self> {
        check_declared(&inputs, &outputs, &language)?;
        let automaton = Arc::new(Automaton::compile(&language));
        Ok(Self {
            description: description.into(),
            inputs,
            outputs,
            language,
            automaton,
        })
    }

    /// Like `new`, but parses the language from text first.
    pub fn from_text(
        description: impl Into<String>,
        inputs: BTreeMap<ChannelName, PayloadType>,
        outputs: BTreeMap<ChannelName, PayloadType>,
        language: &str,
    ) -> ProtocolResult<Self> {
        let language = parse_language(language)?;
        Self::new(description, inputs, outputs, language)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn inputs(&self) -> &BTreeMap<ChannelName, PayloadType> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<ChannelName, PayloadType> {
        &self.outputs
    }

    pub fn channels(&self, dir: Dir) -> &BTreeMap<ChannelName, PayloadType> {
        match dir {
            Dir::In => &self.inputs,
            Dir::Out => &self.outputs,
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn automaton(&self) -> &Arc<Automaton> {
        &self.automaton
    }

    /// A fresh acceptor sharing this protocol's automaton
    pub fn checker(&self) -> LanguageChecker {
        LanguageChecker::new(self.automaton.clone())
    }

    /// Payload type of a declared channel
    pub fn resolve(&self, dir: Dir, channel: &str) -> ProtocolResult<&PayloadType> {
        let table = self.channels(dir);
        table
            .get(channel)
            .ok_or_else(|| ProtocolError::UnknownChannel {
                dir,
                channel: channel.to_string(),
                known: table.keys().cloned().collect(),
            })
    }

    pub fn describe(&self) -> ProtocolDescription {
        ProtocolDescription {
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            language: self.language.to_string(),
        }
    }
}

/// Serializable summary of a protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescription {
    pub description: String,
    pub inputs: BTreeMap<ChannelName, PayloadType>,
    pub outputs: BTreeMap<ChannelName, PayloadType>,
    pub language: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::checker::Verdict;
    use crate::ir::Event;

    pub fn table(entries: &[(&str, &str)]) -> BTreeMap<ChannelName, PayloadType> {
        entries
            .iter()
            .map(|(channel, tpe)| (channel.to_string(), PayloadType::new(*tpe)))
            .collect()
    }

    fn echo() -> InteractionProtocol {
        InteractionProtocol::from_text(
            "echo",
            table(&[("image", "JPGImage")]),
            table(&[("image", "JPGImage")]),
            "(in:image ; out:image)*",
        )
        .unwrap()
    }

    #[test]
    fn resolves_declared_channels() {
        let p = echo();
        assert_eq!(p.resolve(Dir::In, "image").unwrap().as_str(), "JPGImage");
        assert_eq!(p.resolve(Dir::Out, "image").unwrap(), &PayloadType::new("JPGImage"));
    }

    #[test]
    fn unknown_channel_names_the_known_ones() {
        let p = echo();
        let err = p.resolve(Dir::In, "Image").unwrap_err();
        let ProtocolError::UnknownChannel { dir, channel, known } = &err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(*dir, Dir::In);
        assert_eq!(channel, "Image");
        assert_eq!(known, &vec!["image".to_string()]);
        assert_eq!(
            err.to_string(),
            "input channel `Image` not found in protocol; known: [image]"
        );
    }

    #[test]
    fn undeclared_channel_is_rejected() {
        let err = InteractionProtocol::from_text(
            "broken",
            table(&[("image", "JPGImage")]),
            table(&[]),
            "in:image ; out:image",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UndeclaredChannel { dir: Dir::Out, ref channel } if channel == "image"
        ));
    }

    #[test]
    fn syntax_errors_surface() {
        let err = InteractionProtocol::from_text("broken", table(&[]), table(&[]), "in:")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Syntax(_)));
    }

    #[test]
    fn each_checker_is_independent() {
        let p = echo();
        let mut first = p.checker();
        let second = p.checker();
        assert_eq!(first.push(&Event::new(Dir::In, "image")), Verdict::NeedMore);
        assert_eq!(second.finish(), Verdict::Enough);
    }

    #[test]
    fn description_serializes_to_json() {
        let json = serde_json::to_value(echo().describe()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "description": "echo",
                "inputs": {"image": "JPGImage"},
                "outputs": {"image": "JPGImage"},
                "language": "(in:image ; out:image) *",
            })
        );
    }
}
