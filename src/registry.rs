// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use clap::ColorChoice;
use lazy_static::lazy_static;

use crate::diagnostic::{DiagnosticHandler, Level};
use crate::errors::{ProtocolError, ProtocolResult};
use crate::parser::{parse_file, parse_protocols};
use crate::protocol::InteractionProtocol;

const BUILTIN_SOURCE: &str = include_str!("builtin.prot");

lazy_static! {
    static ref BUILTIN: Registry = {
        // warnings are silenced: several built-in protocols declare
        // channels their language does not use yet
        let mut handler = DiagnosticHandler::new(ColorChoice::Never, false);
        let mut registry = Registry::default();
        match parse_protocols("builtin.prot".to_string(), BUILTIN_SOURCE.to_string(), &mut handler) {
            Ok(protocols) => {
                for (name, protocol) in protocols {
                    registry.protocols.insert(name, Arc::new(protocol));
                }
            }
            Err(err) => panic!("built-in protocol library is malformed: {}", err),
        }
        registry
    };
}

/// Named interaction protocols
#[derive(Debug, Clone, Default)]
pub struct Registry {
    protocols: BTreeMap<String, Arc<InteractionProtocol>>,
}

impl Registry {
    /// The protocols of the reference pipeline
    pub fn builtin() -> Registry {
        BUILTIN.clone()
    }

    pub fn insert(&mut self, name: impl Into<String>, protocol: InteractionProtocol) -> ProtocolResult<()> {
        let name = name.into();
        if self.protocols.contains_key(&name) {
            return Err(ProtocolError::DuplicateProtocol(name));
        }
        self.protocols.insert(name, Arc::new(protocol));
        Ok(())
    }

    /// Adds every protocol defined in `filename`. Returns the new names.
    pub fn load_file(
        &mut self,
        filename: impl AsRef<Path>,
        handler: &mut DiagnosticHandler,
    ) -> ProtocolResult<Vec<String>> {
        let mut names = vec![];
        for (name, protocol) in parse_file(filename, handler)? {
            if let Err(err) = self.insert(name.clone(), protocol) {
                handler.emit_general_message(&err.to_string(), Level::Error);
                return Err(err);
            }
            names.push(name);
        }
        Ok(names)
    }

    pub fn get(&self, name: &str) -> ProtocolResult<Arc<InteractionProtocol>> {
        self.protocols
            .get(name)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownProtocol {
                name: name.to_string(),
                known: self.names().map(|n| n.to_string()).collect(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.protocols.keys().map(|n| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<InteractionProtocol>)> {
        self.protocols.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use insta::Settings;

    use super::*;
    use crate::checker::Verdict;
    use crate::ir::{Dir, Event};

    fn snap(name: &str, content: String) {
        let mut settings = Settings::clone_current();
        settings.set_snapshot_path(Path::new("../tests/snapshots"));
        settings.bind(|| {
            insta::assert_snapshot!(name, content);
        });
    }

    fn run(protocol: &InteractionProtocol, events: &[(Dir, &str)]) -> Verdict {
        let mut checker = protocol.checker();
        let mut verdict = checker.finish();
        for (dir, channel) in events {
            verdict = checker.push(&Event::new(*dir, *channel));
        }
        verdict
    }

    #[test]
    fn builtin_protocols() {
        let registry = Registry::builtin();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "agent",
                "agent_jpg_pwm",
                "image_filter",
                "image_source",
                "node_wrapper",
                "scenario_maker",
                "scorer",
                "simulator",
            ]
        );
        let agent = registry.get("agent").unwrap();
        assert!(agent.description().contains("\"observations\""));
        assert_eq!(agent.resolve(Dir::In, "seed").unwrap().as_str(), "int");
    }

    #[test]
    fn builtin_sessions() {
        use Dir::*;
        let registry = Registry::builtin();

        let source = registry.get("image_source").unwrap();
        let episode = [
            (In, "next_episode"),
            (Out, "episode_start"),
            (In, "next_image"),
            (Out, "image"),
            (In, "next_image"),
            (Out, "no_more_images"),
            (In, "next_episode"),
            (Out, "no_more_episodes"),
        ];
        assert_eq!(run(&source, &episode), Verdict::Enough);
        assert_eq!(run(&source, &episode[..3]), Verdict::NeedMore);
        assert!(run(&source, &[(Out, "image")]).is_unexpected());

        let agent = registry.get("agent").unwrap();
        assert_eq!(run(&agent, &[]), Verdict::Enough);
        assert_eq!(
            run(
                &agent,
                &[
                    (In, "seed"),
                    (In, "episode_start"),
                    (In, "observations"),
                    (In, "get_commands"),
                ]
            ),
            Verdict::NeedMore
        );
        assert!(run(&agent, &[(In, "episode_start"), (In, "seed")]).is_unexpected());

        let simulator = registry.get("simulator").unwrap();
        let session = [
            (In, "seed"),
            (In, "clear"),
            (In, "set_map"),
            (In, "spawn_robot"),
            (In, "spawn_robot"),
            (In, "episode_start"),
            (In, "step"),
            (In, "get_robot_observations"),
            (Out, "robot_observations"),
            (In, "clear"),
        ];
        assert_eq!(run(&simulator, &session), Verdict::NeedMore);

        let wrapper = registry.get("node_wrapper").unwrap();
        assert_eq!(
            run(&wrapper, &[(In, "describe_config"), (Out, "node_config_state")]),
            Verdict::Enough
        );
    }

    #[test]
    fn unknown_protocol_lists_known_ones() {
        let err = Registry::builtin().get("filter").unwrap_err();
        assert!(err.to_string().starts_with("unknown protocol `filter`; known: [agent, "));
    }

    #[test]
    fn load_file_merges_and_rejects_duplicates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "protocol counter {{ in tick: None; out count: int; language {{ (in:tick ; out:count)+ }} }}"
        )
        .unwrap();

        let mut registry = Registry::builtin();
        let mut handler = DiagnosticHandler::default();
        let names = registry.load_file(file.path(), &mut handler).unwrap();
        assert_eq!(names, vec!["counter".to_string()]);
        assert_eq!(registry.len(), 9);

        let err = registry.load_file(file.path(), &mut handler).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateProtocol(ref n) if n == "counter"));
        assert!(handler
            .error_string()
            .contains("protocol `counter` is defined more than once"));
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn describe_image_filter() {
        let filter = Registry::builtin().get("image_filter").unwrap();
        let content = serde_json::to_string_pretty(&filter.describe()).unwrap();
        snap("describe_image_filter", content);
    }
}
