// Copyright 2025 Cornell University
// released under MIT License

use pest::error::{InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use rustc_hash::FxHashSet;

use crate::diagnostic::{DiagnosticHandler, Level};
use crate::errors::{LanguageSyntaxError, ProtocolError};
use crate::ir::{ChannelName, Dir, Language};
use crate::protocol::{InteractionProtocol, PayloadType};
use crate::static_checks::check_protocol_decl;

#[derive(Parser)]
#[grammar = "language.pest"]
struct LanguageParser;

/// A leaf of a parsed language together with where it appeared in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub dir: Dir,
    pub channel: ChannelName,
    pub span: (usize, usize),
}

/// `in name: Type;` / `out name: Type;` inside a protocol definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDecl {
    pub dir: Dir,
    pub channel: ChannelName,
    pub payload: PayloadType,
    pub span: (usize, usize),
}

/// A `protocol name { ... }` block before it is turned into an
/// `InteractionProtocol`. Keeps source locations for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolDecl {
    pub name: String,
    pub description: String,
    pub channels: Vec<ChannelDecl>,
    pub language: Option<Language>,
    pub refs: Vec<ChannelRef>,
    pub span: (usize, usize),
}

impl ProtocolDecl {
    pub fn channels(&self, dir: Dir) -> impl Iterator<Item = &ChannelDecl> {
        self.channels.iter().filter(move |decl| decl.dir == dir)
    }
}

/// Parses protocol language text such as `(in:image ; out:transformed)*`.
pub fn parse_language(text: &str) -> Result<Language, LanguageSyntaxError> {
    let alternation = LanguageParser::parse(Rule::language, text)
        .map_err(syntax_error)?
        .flat_map(|language| language.into_inner())
        .find(|pair| pair.as_rule() == Rule::alternation);
    match alternation {
        Some(pair) => Ok(LanguageBuilder::default().build(pair)),
        None => unreachable!("the language rule always contains an alternation"),
    }
}

/// Reads and parses a protocol definition file, reporting problems through
/// `handler`. Returns the protocols in definition order.
pub fn parse_file(
    filename: impl AsRef<std::path::Path>,
    handler: &mut DiagnosticHandler,
) -> Result<Vec<(String, InteractionProtocol)>, ProtocolError> {
    let name = filename.as_ref().to_string_lossy().to_string();
    let input = std::fs::read_to_string(filename)?;
    parse_protocols(name, input, handler)
}

/// Parses the contents of a protocol definition file. `name` is only used to
/// label diagnostics.
pub fn parse_protocols(
    name: String,
    input: String,
    handler: &mut DiagnosticHandler,
) -> Result<Vec<(String, InteractionProtocol)>, ProtocolError> {
    let fileid = handler.add_file(name.clone(), input.clone());
    let errors_before = handler.error_count();

    let pairs = match LanguageParser::parse(Rule::file, &input) {
        Ok(pairs) => pairs,
        Err(err) => {
            let err = syntax_error(err);
            let msg = format!("Lexing failed: {}", err.message);
            handler.emit_diagnostic_span(&msg, fileid, err.span.0, err.span.1, Level::Error);
            return Err(err.into());
        }
    };

    let mut context = ParserContext { fileid, handler };
    let mut decls = vec![];
    let mut seen = FxHashSet::default();
    for pair in pairs.flat_map(|file| file.into_inner()) {
        if pair.as_rule() != Rule::protocol_def {
            continue;
        }
        let decl = context.parse_protocol_def(pair);
        if !seen.insert(decl.name.clone()) {
            let msg = format!("Protocol `{}` is defined more than once", decl.name);
            context.emit(&msg, decl.span);
        }
        // keep going so that every problem in the file gets reported
        check_protocol_decl(&decl, context.handler, fileid);
        decls.push(decl);
    }

    let errors = handler.error_count() - errors_before;
    if errors > 0 {
        return Err(ProtocolError::Diagnostics(format!(
            "{} error(s) while parsing {}",
            errors, name
        )));
    }

    let mut protocols = vec![];
    for decl in decls {
        let inputs = decl
            .channels(Dir::In)
            .map(|c| (c.channel.clone(), c.payload.clone()))
            .collect();
        let outputs = decl
            .channels(Dir::Out)
            .map(|c| (c.channel.clone(), c.payload.clone()))
            .collect();
        let Some(language) = decl.language else {
            unreachable!("protocols without a language are rejected by the static checks")
        };
        let protocol = InteractionProtocol::new(decl.description, inputs, outputs, language)?;
        protocols.push((decl.name, protocol));
    }
    Ok(protocols)
}

struct ParserContext<'a> {
    fileid: usize,
    handler: &'a mut DiagnosticHandler,
}

impl ParserContext<'_> {
    fn emit(&mut self, message: &str, span: (usize, usize)) {
        self.handler
            .emit_diagnostic_span(message, self.fileid, span.0, span.1, Level::Error);
    }

    fn parse_protocol_def(&mut self, pair: Pair<'_, Rule>) -> ProtocolDecl {
        let span = (pair.as_span().start(), pair.as_span().end());
        let mut decl = ProtocolDecl {
            name: String::new(),
            description: String::new(),
            channels: vec![],
            language: None,
            refs: vec![],
            span,
        };
        let mut described = false;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::kw_protocol => {}
                Rule::ident => decl.name = inner.as_str().to_string(),
                Rule::description => {
                    if described {
                        self.handler.emit_diagnostic_parsing(
                            "Protocol description given more than once",
                            self.fileid,
                            &inner,
                            Level::Error,
                        );
                    }
                    described = true;
                    let text = inner
                        .into_inner()
                        .flat_map(|string| string.into_inner())
                        .map(|string_inner| string_inner.as_str())
                        .next()
                        .unwrap_or_default();
                    decl.description = unescape(text.trim());
                }
                Rule::channel_decl => {
                    if let Some(channel) = self.parse_channel_decl(inner) {
                        decl.channels.push(channel);
                    }
                }
                Rule::language_def => {
                    if decl.language.is_some() {
                        self.handler.emit_diagnostic_parsing(
                            "Protocol language given more than once",
                            self.fileid,
                            &inner,
                            Level::Error,
                        );
                        continue;
                    }
                    let mut builder = LanguageBuilder::default();
                    decl.language = inner
                        .into_inner()
                        .find(|p| p.as_rule() == Rule::alternation)
                        .map(|alternation| builder.build(alternation));
                    decl.refs = builder.refs;
                }
                rule => unreachable!("unexpected rule in protocol definition: {:?}", rule),
            }
        }
        decl
    }

    fn parse_channel_decl(&mut self, pair: Pair<'_, Rule>) -> Option<ChannelDecl> {
        let span = (pair.as_span().start(), pair.as_span().end());
        let mut inner = pair.clone().into_inner();
        let (Some(dir), Some(channel), Some(payload)) = (inner.next(), inner.next(), inner.next())
        else {
            self.handler.emit_diagnostic_parsing(
                "Expected `in|out <name>: <type>;`",
                self.fileid,
                &pair,
                Level::Error,
            );
            return None;
        };
        let dir = match dir.as_str() {
            "in" => Dir::In,
            "out" => Dir::Out,
            other => {
                let msg = format!("Unexpected direction string: {:?}", other);
                self.handler
                    .emit_diagnostic_parsing(&msg, self.fileid, &dir, Level::Error);
                return None;
            }
        };
        Some(ChannelDecl {
            dir,
            channel: channel.as_str().to_string(),
            payload: PayloadType::new(payload.as_str()),
            span,
        })
    }
}

/// Lowers the pest parse tree of an `alternation` into a `Language`,
/// remembering the source span of every leaf.
#[derive(Default)]
struct LanguageBuilder {
    refs: Vec<ChannelRef>,
}

impl LanguageBuilder {
    fn build(&mut self, pair: Pair<'_, Rule>) -> Language {
        match pair.as_rule() {
            Rule::alternation => {
                let branches = pair.into_inner().map(|p| self.build(p)).collect();
                collapse(branches, Language::Either)
            }
            Rule::sequence => {
                let steps = pair.into_inner().map(|p| self.build(p)).collect();
                collapse(steps, Language::Sequence)
            }
            Rule::postfix => {
                let mut inner = pair.into_inner();
                let l = match inner.next() {
                    Some(atom) => self.build(atom),
                    None => unreachable!("postfix always starts with an atom"),
                };
                match inner.next().map(|op| op.as_rule()) {
                    None => l,
                    Some(Rule::zero_or_more) => Language::zero_or_more(l),
                    Some(Rule::one_or_more) => Language::one_or_more(l),
                    Some(Rule::optional) => Language::optional(l),
                    Some(rule) => unreachable!("expected postfix operator, found {:?}", rule),
                }
            }
            Rule::group => match pair.into_inner().next() {
                Some(alternation) => self.build(alternation),
                None => unreachable!("group always contains an alternation"),
            },
            Rule::expect_input | Rule::expect_output => {
                let dir = if pair.as_rule() == Rule::expect_input {
                    Dir::In
                } else {
                    Dir::Out
                };
                let text = pair.as_str();
                let channel = text.split_once(':').map_or(text, |(_, name)| name);
                self.refs.push(ChannelRef {
                    dir,
                    channel: channel.to_string(),
                    span: (pair.as_span().start(), pair.as_span().end()),
                });
                Language::expect(dir, channel)
            }
            rule => unreachable!("Language::build expected a language rule, found {:?}", rule),
        }
    }
}

/// Resolves `\"` and `\\` inside description strings
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// One-element sequences and alternations stand for their only element.
fn collapse(mut ls: Vec<Language>, wrap: fn(Vec<Language>) -> Language) -> Language {
    if ls.len() == 1 {
        ls.remove(0)
    } else {
        wrap(ls)
    }
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::postfix => "an event such as `in:<name>` or `out:<name>`".to_string(),
        Rule::expect_input => "`in:<name>`".to_string(),
        Rule::expect_output => "`out:<name>`".to_string(),
        Rule::group => "`(`".to_string(),
        Rule::zero_or_more => "`*`".to_string(),
        Rule::one_or_more => "`+`".to_string(),
        Rule::optional => "`?`".to_string(),
        Rule::ident => "a channel name".to_string(),
        Rule::EOI => "end of input".to_string(),
        Rule::protocol_def | Rule::kw_protocol => "`protocol <name> { ... }`".to_string(),
        Rule::description => "`description \"...\";`".to_string(),
        Rule::channel_decl => "`in|out <name>: <type>;`".to_string(),
        Rule::language_def => "`language { ... }`".to_string(),
        other => format!("{:?}", other),
    }
}

fn syntax_error(err: pest::error::Error<Rule>) -> LanguageSyntaxError {
    let err = err.renamed_rules(describe_rule);
    let span = match err.location {
        InputLocation::Pos(pos) => (pos, pos),
        InputLocation::Span(span) => span,
    };
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    let snippet = format!("{}\n{}^", err.line(), " ".repeat(column.saturating_sub(1)));
    LanguageSyntaxError {
        message: err.variant.message().to_string(),
        span,
        line,
        column,
        snippet,
    }
}
