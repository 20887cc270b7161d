//! Host command double returning canned results
//!
//! Rules are matched against the rendered command line in registration
//! order; the first rule whose pattern is a prefix of the command line wins.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;

use vlansync_common::shell::command_line;
use vlansync_common::{ExecContext, ExecResult, HostCommand, VlanError, VlanResult};

#[derive(Debug, Clone)]
enum Reply {
    Result(ExecResult),
    SpawnFailure,
}

/// [`HostCommand`] with canned replies and a call log.
///
/// Unmatched commands get the default result, which is exit code 127
/// unless replaced with [`ScriptedHost::with_default`].
#[derive(Debug)]
pub struct ScriptedHost {
    rules: Vec<(String, Reply)>,
    default: ExecResult,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHost {
    /// Host with no rules
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default: ExecResult::failed(127, "command not scripted"),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `result` to command lines starting with `pattern`
    pub fn on(mut self, pattern: &str, result: ExecResult) -> Self {
        self.rules.push((pattern.to_string(), Reply::Result(result)));
        self
    }

    /// Fail to spawn command lines starting with `pattern`
    pub fn spawn_failure(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Reply::SpawnFailure));
        self
    }

    /// Reply with `result` to unmatched commands
    pub fn with_default(mut self, result: ExecResult) -> Self {
        self.default = result;
        self
    }

    /// Command lines executed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of executed commands starting with `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(pattern))
            .count()
    }
}

#[async_trait]
impl HostCommand for ScriptedHost {
    async fn execute(
        &self,
        name: &str,
        args: &[&str],
        ctx: &ExecContext,
    ) -> VlanResult<ExecResult> {
        let command = command_line(name, args);
        if ctx.is_cancelled() {
            return Err(VlanError::Cancelled { command });
        }
        self.calls.lock().push(command.clone());

        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| command.starts_with(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Result(result)) => Ok(result),
            Some(Reply::SpawnFailure) => Err(VlanError::Spawn {
                command,
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            }),
            None => Ok(self.default.clone()),
        }
    }
}
