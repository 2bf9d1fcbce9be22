// Copyright 2025 Cornell University
// released under MIT License

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use log::{debug, error, info, warn};

use crate::checker::Verdict;
use crate::errors::ProtocolResult;
use crate::ir::{Dir, Event};
use crate::node::{check_implementation, violation, Context, Node};
use crate::protocol::InteractionProtocol;
use crate::translation::ChannelTranslation;
use crate::wire::{Control, Incoming, MessageReader, WRAPPER_PREFIX};

/// Connects a node to its protocol and runs the receive/dispatch loop
pub struct Wrapper {
    node: Box<dyn Node>,
    protocol: Arc<InteractionProtocol>,
    translation: ChannelTranslation,
}

impl Wrapper {
    /// Fails if the node lacks a handler for one of the protocol's inputs
    pub fn bind(node: Box<dyn Node>, protocol: Arc<InteractionProtocol>) -> ProtocolResult<Self> {
        check_implementation(node.as_ref(), &protocol)?;
        Ok(Self {
            node,
            protocol,
            translation: ChannelTranslation::default(),
        })
    }

    pub fn with_translation(mut self, translation: ChannelTranslation) -> Self {
        self.translation = translation;
        self
    }

    pub fn node(&self) -> &dyn Node {
        self.node.as_ref()
    }

    /// Reads messages from `input` until end of stream, checking every input
    /// and output against the protocol. Returns the verdict at end of stream.
    /// Undeclared inputs and protocol violations abort the session.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, output: &mut W) -> anyhow::Result<Verdict> {
        let Wrapper {
            node,
            protocol,
            translation,
        } = self;
        let protocol: &InteractionProtocol = protocol;
        let translation: &ChannelTranslation = translation;
        let name = node.name().to_string();
        let mut checker = protocol.checker();

        node.init(&mut Context::new(&name, protocol, &mut checker, output, translation))?;

        info!("{}: starting to read", name);
        let mut messages = MessageReader::new(input);
        while let Some(msg) = messages.next() {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    error!("{}: line {}: {}", name, messages.lineno(), e);
                    return Err(e).with_context(|| format!("while reading line {}", messages.lineno()));
                }
            };
            let incoming = Incoming::classify(msg)?;
            let msg = match incoming {
                Incoming::Control(Control::SetConfig { key, value }) => {
                    if let Err(e) = node.set_config(&key, value.clone()) {
                        error!("{}: {}", name, e);
                    }
                    let mut ctx = Context::new(&name, protocol, &mut checker, output, translation);
                    node.on_updated_config(&key, &value, &mut ctx)?;
                    continue;
                }
                Incoming::Control(Control::Unknown(command)) => {
                    warn!("{}: ignoring control message `{}{}`", name, WRAPPER_PREFIX, command);
                    continue;
                }
                Incoming::Channel(msg) => msg,
            };

            let channel = translation.inbound(&msg.topic).to_string();
            if let Err(e) = protocol.resolve(Dir::In, &channel) {
                error!("{}: {}", name, e);
                return Err(e.into());
            }

            let event = Event::new(Dir::In, channel.as_str());
            let expected = checker.expected();
            let verdict = checker.push(&event);
            if let Verdict::Unexpected(reason) = &verdict {
                let err = violation(event, reason.clone(), &expected);
                error!("{}: {}", name, err);
                return Err(err.into());
            }
            debug!("{}: received `{}`, now {}", name, channel, verdict);

            let mut ctx = Context::new(&name, protocol, &mut checker, output, translation);
            if let Err(e) = node.on_received(&channel, msg.data, &mut ctx) {
                error!("{}: while handling `{}`: {:#}", name, channel, e);
                return Err(e);
            }
        }
        info!("{}: end of input", name);

        let verdict = checker.finish();
        match &verdict {
            Verdict::Unexpected(reason) => error!("{}: protocol did not finish: {}", name, reason),
            Verdict::NeedMore => {
                let expected: Vec<String> = checker.expected().iter().map(|m| m.to_string()).collect();
                warn!(
                    "{}: input ended while the protocol expects more: [{}]",
                    name,
                    expected.join(", ")
                );
            }
            Verdict::Enough => {}
        }

        node.finish(&mut Context::new(&name, protocol, &mut checker, output, translation))?;
        Ok(verdict)
    }
}

/// Opens the streams for `run`. Standard input and output are used when no
/// path is given. Waits for `input` to be created, which lets the other end
/// of a named pipe start later.
pub fn open_streams(
    input: Option<&Path>,
    output: Option<&Path>,
) -> ProtocolResult<(Box<dyn BufRead>, Box<dyn Write>)> {
    let writer: Box<dyn Write> = match output {
        None => Box::new(std::io::stdout()),
        Some(path) => {
            info!("Opening output file {}", path.display());
            if is_fifo(path) {
                info!("Fifo detected. This will block until a reader appears.");
            }
            Box::new(File::create(path)?)
        }
    };

    let reader: Box<dyn BufRead> = match input {
        None => Box::new(BufReader::new(std::io::stdin())),
        Some(path) => {
            while !path.exists() {
                info!("waiting for file {} to be created", path.display());
                std::thread::sleep(Duration::from_secs(1));
            }
            Box::new(BufReader::new(File::open(path)?))
        }
    };
    Ok((reader, writer))
}

#[cfg(unix)]
fn is_fifo(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|m| m.file_type().is_fifo())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_fifo(_path: &Path) -> bool {
    false
}
