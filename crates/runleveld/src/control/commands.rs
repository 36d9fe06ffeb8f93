//! Registered tools, extra command words and the custom commander.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;

use runlevel_protocol::{Reply, ToolKind};
use thiserror::Error;

/// Error type returned by registered command handlers.
pub type CommandError = Box<dyn Error + Send + Sync>;

/// A maintenance tool that ran but failed.
///
/// The captured output is relayed to the client ahead of the message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolError {
    /// Output the tool produced before failing.
    pub output: String,
    /// Failure description.
    pub message: String,
}

impl ToolError {
    /// Builds a tool failure from its output and a message.
    pub fn new(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            message: message.into(),
        }
    }
}

pub(crate) type ToolFn = Box<dyn Fn() -> Result<String, ToolError> + Send + Sync>;
pub(crate) type CommandFn = Box<dyn Fn(&str) -> Result<String, CommandError> + Send + Sync>;

const BUILTIN_HELP: &str =
    "Commands: help status telinit runlevel KICK redeploy reconfig CUSTOM HELLO";

/// Application-supplied command handlers consulted by the control socket.
#[derive(Default)]
pub(crate) struct CommandSet {
    tools: HashMap<ToolKind, ToolFn>,
    commands: BTreeMap<String, CommandFn>,
    custom: Option<CommandFn>,
}

impl CommandSet {
    pub(crate) fn insert_tool(&mut self, kind: ToolKind, tool: ToolFn) {
        self.tools.insert(kind, tool);
    }

    pub(crate) fn insert_command(&mut self, word: impl Into<String>, command: CommandFn) {
        self.commands.insert(word.into(), command);
    }

    pub(crate) fn set_custom(&mut self, custom: CommandFn) {
        self.custom = Some(custom);
    }

    pub(crate) fn run_tool(&self, kind: ToolKind) -> Reply {
        let Some(tool) = self.tools.get(&kind) else {
            return Reply::text(format!("{kind} is not enabled"));
        };
        match tool() {
            Ok(output) => Reply::text(output),
            Err(error) => Reply::error(format!("{}\nERROR: {}", error.output, error.message)),
        }
    }

    /// Lists the built-in commands followed by enabled tools and registered
    /// words.
    pub(crate) fn help(&self) -> String {
        let mut text = BUILTIN_HELP.to_owned();
        for kind in ToolKind::ALL {
            if self.tools.contains_key(&kind) {
                text.push(' ');
                text.push_str(&kind.to_string());
            }
        }
        for word in self.commands.keys() {
            text.push(' ');
            text.push_str(word);
        }
        text
    }

    /// Handles `CUSTOM <args>`.
    pub(crate) fn run_custom(&self, args: &str) -> Reply {
        match &self.custom {
            Some(custom) => into_reply(custom(args)),
            None => Reply::text(format!("not defined: {args:?}")),
        }
    }

    /// Handles text that matched no built-in command.
    pub(crate) fn run_other(&self, text: &str) -> Reply {
        let (word, rest) = text.split_once(' ').unwrap_or((text, ""));
        if let Some(command) = self.commands.get(word) {
            return into_reply(command(rest.trim_start()));
        }
        match &self.custom {
            Some(custom) => into_reply(custom(text)),
            None => Reply::error(format!("Command not found: {text}")),
        }
    }
}

fn into_reply(result: Result<String, CommandError>) -> Reply {
    match result {
        Ok(text) => Reply::text(text),
        Err(error) => Reply::error(error.to_string()),
    }
}
