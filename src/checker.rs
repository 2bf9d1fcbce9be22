// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::automaton::{Automaton, EventMatcher, NodeId, Transition};
use crate::ir::Event;

/// Outcome of feeding events to a `LanguageChecker`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// what was observed so far is a complete instance of the protocol
    Enough,
    /// legal so far, but more events are required
    NeedMore,
    /// the observed sequence cannot be continued legally
    Unexpected(String),
}

impl Verdict {
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Verdict::Unexpected(_))
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Enough => write!(f, "enough"),
            Verdict::NeedMore => write!(f, "need more"),
            Verdict::Unexpected(reason) => write!(f, "unexpected: {}", reason),
        }
    }
}

/// Streaming acceptor. Tracks the set of automaton nodes that are
/// consistent with every event pushed so far.
#[derive(Debug, Clone)]
pub struct LanguageChecker {
    automaton: Arc<Automaton>,
    active: FxHashSet<NodeId>,
}

impl LanguageChecker {
    pub fn new(automaton: Arc<Automaton>) -> Self {
        let mut active = FxHashSet::default();
        active.insert(automaton.start());
        let mut checker = Self { automaton, active };
        checker.settle();
        checker
    }

    /// Advances on `event`. Only nodes with a matching edge survive.
    pub fn push(&mut self, event: &Event) -> Verdict {
        let mut next = FxHashSet::default();
        for &node in self.active.iter() {
            for edge in self.automaton.edges(node) {
                if let Transition::Expect(matcher) = &edge.label {
                    if matcher.matches(event) {
                        next.insert(edge.target);
                    }
                }
            }
        }
        self.active = next;
        self.settle();
        self.finish()
    }

    /// Verdict for the events pushed so far, without consuming anything.
    pub fn finish(&self) -> Verdict {
        if self.active.is_empty() {
            Verdict::Unexpected("no continuation possible".to_string())
        } else if self.active.contains(&self.automaton.accept()) {
            Verdict::Enough
        } else {
            Verdict::NeedMore
        }
    }

    /// Events that would be accepted by the next `push`, sorted.
    pub fn expected(&self) -> Vec<EventMatcher> {
        let expected: BTreeSet<&EventMatcher> = self
            .active
            .iter()
            .flat_map(|&node| self.automaton.edges(node))
            .filter_map(|edge| match &edge.label {
                Transition::Expect(matcher) => Some(matcher),
                Transition::Epsilon => None,
            })
            .collect();
        expected.into_iter().cloned().collect()
    }

    pub fn active_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self.active.iter().copied().collect();
        nodes.sort();
        nodes
    }

    pub fn automaton(&self) -> &Arc<Automaton> {
        &self.automaton
    }

    /// Follows epsilon edges to a fixed point. Nodes that can only move on
    /// epsilon edges are replaced by their targets, unless they lie on an
    /// epsilon cycle.
    fn settle(&mut self) {
        let automaton = &self.automaton;
        let mut closure = self.active.clone();
        let mut todo: Vec<NodeId> = closure.iter().copied().collect();
        while let Some(node) = todo.pop() {
            for edge in automaton.edges(node) {
                if edge.label == Transition::Epsilon && closure.insert(edge.target) {
                    todo.push(edge.target);
                }
            }
        }
        self.active = closure
            .into_iter()
            .filter(|&node| !only_epsilon(automaton, node) || on_epsilon_cycle(automaton, node))
            .collect();
    }
}

fn only_epsilon(a: &Automaton, node: NodeId) -> bool {
    let edges = a.edges(node);
    !edges.is_empty() && edges.iter().all(|e| e.label == Transition::Epsilon)
}

fn on_epsilon_cycle(a: &Automaton, node: NodeId) -> bool {
    let mut seen = FxHashSet::default();
    let mut todo = vec![node];
    while let Some(n) = todo.pop() {
        for edge in a.edges(n) {
            if edge.label != Transition::Epsilon {
                continue;
            }
            if edge.target == node {
                return true;
            }
            if seen.insert(edge.target) {
                todo.push(edge.target);
            }
        }
    }
    false
}
