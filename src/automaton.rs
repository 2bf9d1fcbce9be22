// Copyright 2025 Cornell University
// released under MIT License

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::ir::{ChannelName, Dir, Event, Language};

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct NodeId(u32);
entity_impl!(NodeId, "node");

/// Matches exactly one kind of event: a direction plus a channel name
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventMatcher {
    pub dir: Dir,
    pub channel: ChannelName,
}

impl EventMatcher {
    pub fn matches(&self, event: &Event) -> bool {
        self.dir == event.dir() && self.channel == event.channel()
    }
}

impl std::fmt::Display for EventMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dir, self.channel)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Transition {
    /// taken without consuming an event
    Epsilon,
    Expect(EventMatcher),
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Edge {
    pub label: Transition,
    pub target: NodeId,
}

/// Nondeterministic automaton over events compiled from a `Language`.
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton {
    /// outgoing edges of every node
    edges: PrimaryMap<NodeId, Vec<Edge>>,
    start: NodeId,
    accept: NodeId,
}

impl Automaton {
    /// Thompson-style construction: every sub-language is placed between a
    /// given start and accept node.
    pub fn compile(l: &Language) -> Self {
        let mut edges = PrimaryMap::new();
        let start = edges.push(vec![]);
        let accept = edges.push(vec![]);
        let mut a = Self {
            edges,
            start,
            accept,
        };
        a.lower(l, start, accept);
        a
    }

    fn add_node(&mut self) -> NodeId {
        self.edges.push(vec![])
    }

    fn add_edge(&mut self, from: NodeId, label: Transition, target: NodeId) {
        self.edges[from].push(Edge { label, target });
    }

    fn add_expect(&mut self, from: NodeId, dir: Dir, channel: &str, target: NodeId) {
        let matcher = EventMatcher {
            dir,
            channel: channel.to_string(),
        };
        self.add_edge(from, Transition::Expect(matcher), target);
    }

    fn lower(&mut self, l: &Language, start: NodeId, accept: NodeId) {
        match l {
            Language::ExpectInput(channel) => self.add_expect(start, Dir::In, channel, accept),
            Language::ExpectOutput(channel) => self.add_expect(start, Dir::Out, channel, accept),
            Language::Sequence(ls) => {
                let mut current = start;
                for (ii, child) in ls.iter().enumerate() {
                    let next = if ii + 1 == ls.len() {
                        accept
                    } else {
                        self.add_node()
                    };
                    self.lower(child, current, next);
                    current = next;
                }
                if ls.is_empty() {
                    self.add_edge(start, Transition::Epsilon, accept);
                }
            }
            Language::ZeroOrMore(child) => {
                self.add_edge(start, Transition::Epsilon, accept);
                self.lower(child, accept, accept);
            }
            Language::OneOrMore(child) => {
                self.lower(child, start, accept);
                self.lower(child, accept, accept);
            }
            Language::Optional(child) => {
                self.add_edge(start, Transition::Epsilon, accept);
                self.lower(child, start, accept);
            }
            Language::Either(ls) => {
                for child in ls {
                    self.lower(child, start, accept);
                }
            }
        }
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn accept(&self) -> NodeId {
        self.accept
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.keys()
    }

    pub fn edges(&self, node: NodeId) -> &[Edge] {
        &self.edges[node]
    }

    fn node_name(&self, node: NodeId) -> String {
        if node == self.start {
            "start".to_string()
        } else if node == self.accept {
            "accept".to_string()
        } else {
            format!("S{}", node.as_u32())
        }
    }

    /// Renders the automaton for graphviz
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph protocol {\n  rankdir=LR;\n");
        for node in self.nodes() {
            let shape = if node == self.accept {
                "doublecircle"
            } else {
                "circle"
            };
            out.push_str(&format!("  {} [shape={}];\n", self.node_name(node), shape));
        }
        for (from, edges) in self.edges.iter() {
            for edge in edges {
                out.push_str(&format!(
                    "  {} -> {} [label=\"{}\"];\n",
                    self.node_name(from),
                    self.node_name(edge.target),
                    edge.label
                ));
            }
        }
        out.push_str("}\n");
        out
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Epsilon => write!(f, "ε"),
            Transition::Expect(matcher) => write!(f, "{}", matcher),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_language;
    use insta::Settings;
    use std::path::Path;

    fn snap(name: &str, content: String) {
        let mut settings = Settings::clone_current();
        settings.set_snapshot_path(Path::new("../tests/snapshots"));
        settings.bind(|| {
            insta::assert_snapshot!(name, content);
        });
    }

    fn compile(text: &str) -> Automaton {
        Automaton::compile(&parse_language(text).unwrap())
    }

    fn labels(a: &Automaton, node: NodeId) -> Vec<(String, NodeId)> {
        a.edges(node)
            .iter()
            .map(|e| (e.label.to_string(), e.target))
            .collect()
    }

    #[test]
    fn leaf_is_a_single_edge() {
        let a = compile("out:image");
        assert_eq!(a.node_count(), 2);
        assert_eq!(labels(&a, a.start()), vec![("out:image".to_string(), a.accept())]);
        assert!(a.edges(a.accept()).is_empty());
    }

    #[test]
    fn sequence_uses_fresh_intermediate_nodes() {
        let a = compile("in:a ; out:b ; out:c");
        assert_eq!(a.node_count(), 4);
        let n2 = NodeId::from_u32(2);
        let n3 = NodeId::from_u32(3);
        assert_eq!(labels(&a, a.start()), vec![("in:a".to_string(), n2)]);
        assert_eq!(labels(&a, n2), vec![("out:b".to_string(), n3)]);
        assert_eq!(labels(&a, n3), vec![("out:c".to_string(), a.accept())]);
    }

    #[test]
    fn repetition_loops_on_accept() {
        let a = compile("out:a *");
        assert_eq!(labels(&a, a.start()), vec![("ε".to_string(), a.accept())]);
        assert_eq!(labels(&a, a.accept()), vec![("out:a".to_string(), a.accept())]);

        let a = compile("out:a +");
        assert_eq!(labels(&a, a.start()), vec![("out:a".to_string(), a.accept())]);
        assert_eq!(labels(&a, a.accept()), vec![("out:a".to_string(), a.accept())]);

        let a = compile("out:a ?");
        assert_eq!(
            labels(&a, a.start()),
            vec![
                ("ε".to_string(), a.accept()),
                ("out:a".to_string(), a.accept())
            ]
        );
        assert!(a.edges(a.accept()).is_empty());
    }

    #[test]
    fn alternatives_share_endpoints() {
        let a = compile("out:a | out:b | in:c");
        assert_eq!(a.node_count(), 2);
        assert_eq!(a.edges(a.start()).len(), 3);
        assert!(a.edges(a.start()).iter().all(|e| e.target == a.accept()));
    }

    #[test]
    fn matcher_compares_direction_and_channel() {
        let m = EventMatcher {
            dir: Dir::In,
            channel: "image".to_string(),
        };
        assert!(m.matches(&Event::new(Dir::In, "image")));
        assert!(!m.matches(&Event::new(Dir::Out, "image")));
        assert!(!m.matches(&Event::new(Dir::In, "Image")));
    }

    #[test]
    fn dot_output() {
        let a = compile("in:next ; (out:image | out:done)*");
        snap("dot_output", a.to_dot());
    }
}
