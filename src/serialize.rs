// Copyright 2025 Cornell University
// released under MIT License

use crate::ir::*;
use std::io::Write;

/// Pretty prints a `Language` so that parsing the result yields the same tree
pub fn render(l: &Language) -> String {
    let mut out = Vec::new();
    serialize_language(&mut out, l).expect("writing to a Vec cannot fail");
    String::from_utf8(out).expect("only valid utf-8 is written")
}

pub fn serialize_language(out: &mut impl Write, l: &Language) -> std::io::Result<()> {
    match l {
        Language::ExpectInput(channel) => write!(out, "in:{}", channel),
        Language::ExpectOutput(channel) => write!(out, "out:{}", channel),
        Language::Sequence(ls) => {
            for (ii, child) in ls.iter().enumerate() {
                if ii > 0 {
                    write!(out, " ; ")?;
                }
                let needs_parens = matches!(child, Language::Sequence(_) | Language::Either(_));
                serialize_child(out, child, needs_parens)?;
            }
            Ok(())
        }
        Language::Either(ls) => {
            for (ii, child) in ls.iter().enumerate() {
                if ii > 0 {
                    write!(out, " | ")?;
                }
                let needs_parens = matches!(child, Language::Either(_));
                serialize_child(out, child, needs_parens)?;
            }
            Ok(())
        }
        Language::Optional(child) => serialize_postfix(out, child, "?"),
        Language::ZeroOrMore(child) => serialize_postfix(out, child, "*"),
        Language::OneOrMore(child) => serialize_postfix(out, child, "+"),
    }
}

fn serialize_postfix(out: &mut impl Write, child: &Language, op: &str) -> std::io::Result<()> {
    serialize_child(out, child, !child.is_leaf())?;
    write!(out, " {}", op)
}

fn serialize_child(out: &mut impl Write, child: &Language, parens: bool) -> std::io::Result<()> {
    if parens {
        write!(out, "(")?;
        serialize_language(out, child)?;
        write!(out, ")")
    } else {
        serialize_language(out, child)
    }
}

/// Pretty prints a `Direction`
impl std::fmt::Display for Dir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dir::In => write!(f, "in"),
            Dir::Out => write!(f, "out"),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::InputReceived(channel) => write!(f, "input `{}`", channel),
            Event::OutputProduced(channel) => write!(f, "output `{}`", channel),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", render(self))
    }
}
