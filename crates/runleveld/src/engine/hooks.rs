use std::collections::HashMap;
use std::error::Error;

use runlevel_protocol::Runlevel;

/// Error type returned by level hooks.
pub type HookError = Box<dyn Error + Send + Sync>;

type Hook = Box<dyn Fn() -> Result<(), HookError> + Send + Sync>;

/// Callbacks run on entry to a runlevel, at most one per level.
#[derive(Default)]
pub(crate) struct HookSet {
    hooks: HashMap<Runlevel, Hook>,
}

impl HookSet {
    /// Registers `hook` for `level`, replacing any earlier registration.
    pub(crate) fn insert<F>(&mut self, level: Runlevel, hook: F)
    where
        F: Fn() -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.insert(level, Box::new(hook));
    }

    pub(crate) fn run(&self, level: Runlevel) -> Result<(), HookError> {
        self.hooks.get(&level).map_or(Ok(()), |hook| hook())
    }
}
