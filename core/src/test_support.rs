//! Scripted `CommandRunner` shared by the unit tests

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::tools::ToolPaths;

/// Typical `dmg pool create` output
pub(crate) const POOL_CREATE_OUTPUT: &str =
    "Creating DAOS pool with automatic storage allocation: 4.0 GB SCM, 40 GB NVMe\n\
     Pool-create command SUCCEEDED: UUID: abc-123, Service replicas: 1\n";

/// One recorded interaction with the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invocation {
    Output(CommandSpec),
    Spawn(CommandSpec),
    Kill(u32),
    Stream(CommandSpec),
}

/// Records every call and answers from a list of scripted responses
///
/// A response applies when its needle is a substring of the command's
/// argument list joined by spaces; the first match wins. Unmatched commands
/// succeed with empty output.
pub(crate) struct MockRunner {
    calls: Mutex<Vec<Invocation>>,
    responses: Mutex<Vec<(String, io::Result<CommandOutput>)>>,
    next_pid: AtomicU32,
    kill_error: Mutex<Option<io::ErrorKind>>,
}

impl MockRunner {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(4242),
            kill_error: Mutex::new(None),
        }
    }

    /// Runner that already knows how to answer `dmg pool create`
    pub(crate) fn with_pool() -> Self {
        let runner = Self::new();
        runner.respond("pool create", CommandOutput::success(POOL_CREATE_OUTPUT));
        runner
    }

    pub(crate) fn respond(&self, needle: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .push((needle.to_string(), Ok(output)));
    }

    pub(crate) fn fail_launch(&self, needle: &str) {
        self.responses.lock().unwrap().push((
            needle.to_string(),
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        ));
    }

    pub(crate) fn fail_kill(&self, kind: io::ErrorKind) {
        *self.kill_error.lock().unwrap() = Some(kind);
    }

    pub(crate) fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Argument lists of every command that was run, in order
    pub(crate) fn command_args(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Invocation::Output(spec) | Invocation::Spawn(spec) | Invocation::Stream(spec) => {
                    Some(spec.args.join(" "))
                }
                Invocation::Kill(_) => None,
            })
            .collect()
    }

    pub(crate) fn ran(&self, needle: &str) -> bool {
        self.command_args().iter().any(|args| args.contains(needle))
    }

    fn answer(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let args = spec.args.join(" ");
        let responses = self.responses.lock().unwrap();
        for (needle, response) in responses.iter() {
            if args.contains(needle.as_str()) {
                return match response {
                    Ok(output) => Ok(output.clone()),
                    Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                };
            }
        }
        Ok(CommandOutput::success(""))
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn output(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(Invocation::Output(command.clone()));
        self.answer(command)
    }

    async fn spawn_detached(&self, command: &CommandSpec) -> io::Result<u32> {
        self.calls
            .lock()
            .unwrap()
            .push(Invocation::Spawn(command.clone()));
        self.answer(command)?;
        Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }

    async fn kill(&self, pid: u32) -> io::Result<()> {
        self.calls.lock().unwrap().push(Invocation::Kill(pid));
        match *self.kill_error.lock().unwrap() {
            Some(kind) => Err(io::Error::new(kind, "kill failed")),
            None => Ok(()),
        }
    }

    async fn stream(
        &self,
        command: &CommandSpec,
        lines: mpsc::Sender<String>,
    ) -> io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(Invocation::Stream(command.clone()));
        let output = self.answer(command)?;
        for line in output.stdout.lines() {
            let _ = lines.send(line.to_string()).await;
        }
        Ok(output)
    }
}

/// Tool paths that need no real installation
pub(crate) fn fake_tools() -> ToolPaths {
    ToolPaths {
        fio: "/opt/fio/bin/fio".into(),
        fio_plugin: "/opt/daos/lib/daos_fio_async".into(),
        daos: "/opt/daos/bin/daos".into(),
        dmg: "/opt/daos/bin/dmg".into(),
        daos_agent: "/opt/daos/bin/daos_agent".into(),
    }
}
