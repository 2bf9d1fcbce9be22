// Copyright 2025 Cornell University
// released under MIT License

use std::io::Write;

use clap::ColorChoice;
use codespan_reporting::diagnostic::{
    Diagnostic as CodespanDiagnostic, Label as CodespanLabel, LabelStyle, Severity,
};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{Buffer, Color, ColorSpec, WriteColor};
use pest::iterators::Pair;
use pest::RuleType;
use rustc_hash::FxHashSet;

/// Severity of diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
}

/// A label representing a part of the source code
#[derive(Debug, Clone, PartialEq, Eq)]
struct Label {
    message: Option<String>,
    range: (usize, usize),
}

impl Label {
    fn to_codespan_label(&self, fileid: usize) -> CodespanLabel<usize> {
        CodespanLabel::new(LabelStyle::Primary, fileid, self.range.0..self.range.1)
            .with_message(self.message.clone().unwrap_or_default())
    }
}

/// Diagnostic of a particular part of source code
struct Diagnostic {
    title: String,
    message: String,
    level: Level,
    location: Option<(usize, Label)>,
}

impl Diagnostic {
    fn emit(&self, buffer: &mut Buffer, files: &SimpleFiles<String, String>) {
        if let Some((fileid, label)) = &self.location {
            let severity = match self.level {
                Level::Error => Severity::Error,
                Level::Warning => Severity::Warning,
            };

            let diagnostic = CodespanDiagnostic::new(severity)
                .with_message(&self.message)
                .with_labels(vec![label.to_codespan_label(*fileid)]);

            let config = term::Config::default();
            term::emit(buffer, &config, files, &diagnostic).expect("Failed to write diagnostic");
        } else {
            let color = match self.level {
                Level::Error => Color::Red,
                Level::Warning => Color::Yellow,
            };

            buffer
                .set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)))
                .expect("Failed to set color");
            write!(buffer, "{}", self.title).expect("Failed to write title");
            buffer
                .set_color(&ColorSpec::new())
                .expect("Failed to reset color");
            writeln!(buffer, ": {}", self.message).expect("Failed to write message");
        }
    }
}

/// Collects protocol source files and reports problems in them.
/// Everything emitted is written to stderr (stdout may carry wire traffic)
/// and accumulated in `error_string` so callers and tests can inspect it.
pub struct DiagnosticHandler {
    files: SimpleFiles<String, String>,
    /// `(fileid, start, end)` of every located diagnostic already reported
    reported: FxHashSet<(usize, usize, usize)>,
    error_string: String,
    error_count: usize,
    color_choice: ColorChoice,
    emit_warnings: bool,
}

impl Default for DiagnosticHandler {
    /// Default `DiagnosticHandler` does not emit colored messages, but does emit warnings
    fn default() -> Self {
        Self::new(ColorChoice::Never, true)
    }
}

impl DiagnosticHandler {
    pub fn new(color_choice: ColorChoice, emit_warnings: bool) -> Self {
        Self {
            files: SimpleFiles::new(),
            reported: FxHashSet::default(),
            error_string: String::new(),
            error_count: 0,
            color_choice,
            emit_warnings,
        }
    }

    fn create_buffer(&self) -> Buffer {
        if self.color_choice == ColorChoice::Never {
            Buffer::no_color()
        } else {
            Buffer::ansi()
        }
    }

    pub fn add_file(&mut self, name: String, content: String) -> usize {
        self.files.add(name, content)
    }

    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    /// Number of `Level::Error` diagnostics emitted so far
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Note: parametric over any pest `RuleType`, so that every grammar in
    /// the crate can report against its own pairs
    pub fn emit_diagnostic_parsing<R: RuleType>(
        &mut self,
        message: &str,
        fileid: usize,
        pair: &Pair<'_, R>,
        level: Level,
    ) {
        let span = pair.as_span();
        self.emit_diagnostic_span(message, fileid, span.start(), span.end(), level);
    }

    pub fn emit_diagnostic_span(
        &mut self,
        message: &str,
        fileid: usize,
        start: usize,
        end: usize,
        level: Level,
    ) {
        if level == Level::Warning && !self.emit_warnings {
            return;
        }
        if !self.reported.insert((fileid, start, end)) {
            return;
        }
        let label = Label {
            message: Some(message.to_string()),
            range: (start, end),
        };
        let diagnostic = Diagnostic {
            title: format!("{:?} in file {}", level, fileid),
            message: message.to_string(),
            level,
            location: Some((fileid, label)),
        };
        self.flush(diagnostic);
    }

    pub fn emit_general_message(&mut self, message: &str, level: Level) {
        if level == Level::Warning && !self.emit_warnings {
            return;
        }
        let diagnostic = Diagnostic {
            title: format!("{:?}", level),
            message: message.to_string(),
            level,
            location: None,
        };
        self.flush(diagnostic);
    }

    fn flush(&mut self, diagnostic: Diagnostic) {
        if diagnostic.level == Level::Error {
            self.error_count += 1;
        }
        let mut buffer = self.create_buffer();
        diagnostic.emit(&mut buffer, &self.files);
        let msg = String::from_utf8_lossy(buffer.as_slice());
        self.error_string.push_str(&msg);
        eprint!("{}", msg);
    }
}
