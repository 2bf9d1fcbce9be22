// Copyright 2025 Cornell University
// released under MIT License

pub mod automaton;
pub mod checker;
pub mod diagnostic;
pub mod errors;
pub mod ir;
pub mod node;
pub mod nodes;
pub mod parser;
pub mod protocol;
pub mod registry;
pub mod serialize;
mod static_checks;
pub mod translation;
pub mod wire;
pub mod wrapper;
