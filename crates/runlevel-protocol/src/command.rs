//! Text grammar for control-socket commands.
//!
//! Words are space separated and case sensitive. Text that matches no
//! built-in command is preserved verbatim as [`Command::Other`] so the
//! server can offer it to registered handlers.

use std::fmt;

use strum::{Display, EnumString};
use thiserror::Error;

use crate::level::{Runlevel, RunlevelError};

/// External tool actions a server may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ToolKind {
    /// Fetch newer sources.
    Update,
    /// Rebuild the binary.
    Rebuild,
    /// Update then rebuild.
    Upgrade,
}

impl ToolKind {
    /// Every tool, in help-text order.
    pub const ALL: [Self; 3] = [Self::Update, Self::Rebuild, Self::Upgrade];
}

/// A decoded control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HELLO <identity>`
    Hello(String),
    /// `status`
    Status,
    /// `telinit <n>`
    Telinit(Runlevel),
    /// `runlevel [n]`; without a level the current one is reported.
    Runlevel(Option<Runlevel>),
    /// `KICK`
    Kick,
    /// `redeploy`
    Redeploy,
    /// `update`, `rebuild` or `upgrade`
    Tool(ToolKind),
    /// `reconfig`
    Reconfig,
    /// `help`
    Help,
    /// `CUSTOM <free text>`
    Custom(String),
    /// Anything else, preserved verbatim.
    Other(String),
}

impl Command {
    /// Parses one command line.
    ///
    /// # Errors
    ///
    /// Returns [`CommandParseError`] when the line is empty or a level
    /// argument is missing or invalid.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let text = line.trim();
        let (word, rest) = match text.split_once(' ') {
            Some((word, rest)) => (word, rest.trim()),
            None => (text, ""),
        };

        let command = match word {
            "" => return Err(CommandParseError::Empty),
            "HELLO" => Self::Hello(rest.to_owned()),
            "status" => Self::Status,
            "telinit" => Self::Telinit(parse_level(word, rest)?),
            "runlevel" if rest.is_empty() => Self::Runlevel(None),
            "runlevel" => Self::Runlevel(Some(parse_level(word, rest)?)),
            "KICK" => Self::Kick,
            "redeploy" => Self::Redeploy,
            "reconfig" => Self::Reconfig,
            "help" => Self::Help,
            "CUSTOM" => Self::Custom(rest.to_owned()),
            other => match other.parse::<ToolKind>() {
                Ok(kind) if rest.is_empty() => Self::Tool(kind),
                _ => Self::Other(text.to_owned()),
            },
        };
        Ok(command)
    }
}

fn parse_level(word: &str, argument: &str) -> Result<Runlevel, CommandParseError> {
    if argument.is_empty() {
        return Err(CommandParseError::MissingLevel {
            command: word.to_owned(),
        });
    }
    argument
        .parse()
        .map_err(|source| CommandParseError::InvalidLevel {
            command: word.to_owned(),
            source,
        })
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hello(identity) => write!(formatter, "HELLO {identity}"),
            Self::Status => formatter.write_str("status"),
            Self::Telinit(level) => write!(formatter, "telinit {level}"),
            Self::Runlevel(None) => formatter.write_str("runlevel"),
            Self::Runlevel(Some(level)) => write!(formatter, "runlevel {level}"),
            Self::Kick => formatter.write_str("KICK"),
            Self::Redeploy => formatter.write_str("redeploy"),
            Self::Tool(kind) => write!(formatter, "{kind}"),
            Self::Reconfig => formatter.write_str("reconfig"),
            Self::Help => formatter.write_str("help"),
            Self::Custom(args) => write!(formatter, "CUSTOM {args}"),
            Self::Other(text) => formatter.write_str(text),
        }
    }
}

/// Errors raised while parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    /// The line held no command.
    #[error("empty command")]
    Empty,
    /// A level-changing command arrived without a level.
    #[error("{command} requires a runlevel argument")]
    MissingLevel {
        /// Command word.
        command: String,
    },
    /// The level argument could not be decoded.
    #[error("{command}: {source}")]
    InvalidLevel {
        /// Command word.
        command: String,
        /// Decoding failure.
        #[source]
        source: RunlevelError,
    },
}
