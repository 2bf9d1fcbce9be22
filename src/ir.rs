// Copyright 2025 Cornell University
// released under MIT License

/// Name of a logical input or output channel. Case-sensitive.
pub type ChannelName = String;

/// Direction of a channel, seen from the node implementing a protocol
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dir {
    In,
    Out,
}

impl std::ops::Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::In => Dir::Out,
            Dir::Out => Dir::In,
        }
    }
}

/// Something observed on a channel: a message was received on an input
/// or produced on an output.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Event {
    InputReceived(ChannelName),
    OutputProduced(ChannelName),
}

impl Event {
    pub fn dir(&self) -> Dir {
        match self {
            Event::InputReceived(_) => Dir::In,
            Event::OutputProduced(_) => Dir::Out,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            Event::InputReceived(channel) | Event::OutputProduced(channel) => channel,
        }
    }

    pub fn new(dir: Dir, channel: impl Into<ChannelName>) -> Self {
        match dir {
            Dir::In => Event::InputReceived(channel.into()),
            Dir::Out => Event::OutputProduced(channel.into()),
        }
    }
}

/// Grammar over events. Children are owned, so a `Language` is always a
/// finite tree. `Sequence` and `Either` are never empty when produced by the
/// parser.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Language {
    ExpectInput(ChannelName),
    ExpectOutput(ChannelName),
    /// all of them, in order
    Sequence(Vec<Language>),
    /// zero or one occurrence
    Optional(Box<Language>),
    ZeroOrMore(Box<Language>),
    OneOrMore(Box<Language>),
    /// exactly one of the alternatives
    Either(Vec<Language>),
}

impl Language {
    pub fn expect(dir: Dir, channel: impl Into<ChannelName>) -> Self {
        match dir {
            Dir::In => Language::ExpectInput(channel.into()),
            Dir::Out => Language::ExpectOutput(channel.into()),
        }
    }

    pub fn optional(l: Language) -> Self {
        Language::Optional(Box::new(l))
    }

    pub fn zero_or_more(l: Language) -> Self {
        Language::ZeroOrMore(Box::new(l))
    }

    pub fn one_or_more(l: Language) -> Self {
        Language::OneOrMore(Box::new(l))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Language::ExpectInput(_) | Language::ExpectOutput(_))
    }

    /// Visits every leaf, left to right, yielding its direction and channel.
    pub fn channel_refs(&self) -> Vec<(Dir, &ChannelName)> {
        let mut out = vec![];
        self.collect_channel_refs(&mut out);
        out
    }

    fn collect_channel_refs<'a>(&'a self, out: &mut Vec<(Dir, &'a ChannelName)>) {
        match self {
            Language::ExpectInput(channel) => out.push((Dir::In, channel)),
            Language::ExpectOutput(channel) => out.push((Dir::Out, channel)),
            Language::Sequence(ls) | Language::Either(ls) => {
                for l in ls {
                    l.collect_channel_refs(out);
                }
            }
            Language::Optional(l) | Language::ZeroOrMore(l) | Language::OneOrMore(l) => {
                l.collect_channel_refs(out)
            }
        }
    }
}
