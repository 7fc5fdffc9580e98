//! Process execution for the thin external wrappers (gluster, apt, mkfs)

use crate::common::{Error, Result};
use std::collections::VecDeque;
use std::process::Command;
use std::sync::Mutex;

/// Runs a program to completion and hands back its stdout.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        tracing::debug!("running {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            tracing::error!(
                "subprocess failed stdout: {} stderr: {} returncode: {:?}",
                stdout,
                stderr,
                output.status.code()
            );
            return Err(Error::CommandFailed {
                command: command_line(program, args),
                reason: if stderr.is_empty() { stdout } else { stderr },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Records every invocation and replays canned responses in order.
///
/// Once the queue is empty every call succeeds with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Result<String>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unanswered call.
    pub fn respond(&self, response: Result<String>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Command lines seen so far, `program arg1 arg2 ...`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push(command_line(program, args));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Render a program and its arguments the way a shell user would type it.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_runner_replays_in_order() {
        let runner = RecordingRunner::new();
        runner.respond(Ok("first".into()));
        runner.respond(Err(Error::Other("boom".into())));

        let args = vec!["pool".to_string(), "list".to_string()];
        assert_eq!(runner.run("gluster", &args).unwrap(), "first");
        assert!(runner.run("gluster", &args).is_err());
        assert_eq!(runner.run("gluster", &args).unwrap(), "");
        assert_eq!(runner.calls(), vec!["gluster pool list"; 3]);
    }

    #[test]
    fn test_system_runner_reports_failure() {
        let result = SystemRunner.run("false", &[]);
        match result {
            Err(Error::CommandFailed { command, .. }) => assert_eq!(command, "false"),
            Err(Error::Io(_)) => {} // no `false` binary on this host
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
