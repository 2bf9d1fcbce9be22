// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use crate::diagnostic::{DiagnosticHandler, Level};
use crate::errors::{ProtocolError, ProtocolResult};
use crate::ir::{ChannelName, Dir, Language};
use crate::parser::ProtocolDecl;
use crate::protocol::PayloadType;

/// Checks that every leaf of `language` names a channel declared for its
/// direction. Fails on the first leaf (left to right) that does not.
pub fn check_declared(
    inputs: &BTreeMap<ChannelName, PayloadType>,
    outputs: &BTreeMap<ChannelName, PayloadType>,
    language: &Language,
) -> ProtocolResult<()> {
    for (dir, channel) in language.channel_refs() {
        let table = match dir {
            Dir::In => inputs,
            Dir::Out => outputs,
        };
        if !table.contains_key(channel) {
            return Err(ProtocolError::UndeclaredChannel {
                dir,
                channel: channel.clone(),
            });
        }
    }
    Ok(())
}

/// Well-formedness checks on a parsed protocol definition. Every problem is
/// reported through `handler` at its source location:
/// - channels declared twice for the same direction (error)
/// - a protocol without a `language { ... }` block (error)
/// - language leaves that reference undeclared channels (error); if the
///   channel exists with the opposite direction the message says so
/// - declared channels the language never mentions (warning)
///
/// Callers learn about failures from `handler.error_count()`.
pub fn check_protocol_decl(decl: &ProtocolDecl, handler: &mut DiagnosticHandler, fileid: usize) {
    let mut report = |msg: String, span: (usize, usize)| {
        handler.emit_diagnostic_span(&msg, fileid, span.0, span.1, Level::Error);
    };

    let mut declared: FxHashSet<(Dir, &str)> = FxHashSet::default();
    for channel in &decl.channels {
        if !declared.insert((channel.dir, channel.channel.as_str())) {
            let err = ProtocolError::DuplicateChannel {
                dir: channel.dir,
                channel: channel.channel.clone(),
            };
            report(err.to_string(), channel.span);
        }
    }

    if decl.language.is_none() {
        report(format!("protocol `{}` has no language", decl.name), decl.span);
    }

    for r in &decl.refs {
        if declared.contains(&(r.dir, r.channel.as_str())) {
            continue;
        }
        let err = ProtocolError::UndeclaredChannel {
            dir: r.dir,
            channel: r.channel.clone(),
        };
        let msg = if declared.contains(&(!r.dir, r.channel.as_str())) {
            format!("{} (`{}` is declared as an {}put)", err, r.channel, !r.dir)
        } else {
            err.to_string()
        };
        report(msg, r.span);
    }

    if decl.language.is_some() {
        let used: FxHashSet<(Dir, &str)> = decl
            .refs
            .iter()
            .map(|r| (r.dir, r.channel.as_str()))
            .collect();
        for channel in &decl.channels {
            if !used.contains(&(channel.dir, channel.channel.as_str())) {
                let msg = format!(
                    "{}put channel `{}` is never used by the language of `{}`",
                    channel.dir, channel.channel, decl.name
                );
                handler.emit_diagnostic_span(
                    &msg,
                    fileid,
                    channel.span.0,
                    channel.span.1,
                    Level::Warning,
                );
            }
        }
    }
}
