//! Verification stage runner: compiler, static analyzer, test runner.
//!
//! Every stage runs unconditionally. A tool's non-zero status is data, not an
//! error; even a tool that cannot be spawned yields a [`ToolOutcome`].

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wait_timeout::ChildExt;

use crate::error::Result;
use crate::util::split_command_line;
use crate::workspace::TestWorkspace;

pub const TIMEOUT_EXIT_CODE: i32 = 124;
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

pub const DEFAULT_COMPILER: &str = "solc --gas --bin";
pub const DEFAULT_ANALYZER: &str = "slither";
pub const DEFAULT_TEST_RUNNER: &str = "npx hardhat test";
pub const DEFAULT_SOLC_VERSION: &str = "0.8.25";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.return_code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn parse(raw: &str) -> Result<Self> {
        let (program, args) = split_command_line(raw)?;
        Ok(Self { program, args })
    }

    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How long output readers may lag behind the tool's exit. A descendant
/// that left the process group can keep the pipes open forever.
const PIPE_GRACE: Duration = Duration::from_secs(1);

fn spawn_pipe_reader<R>(reader: Option<R>) -> Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    if let Some(mut reader) = reader {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            let _ = sender.send(buffer);
        });
    }
    receiver
}

fn collect_pipe(receiver: &Receiver<Vec<u8>>) -> String {
    receiver
        .recv_timeout(PIPE_GRACE)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn terminate_process_group(group_leader_pid: u32) {
    if group_leader_pid == 0 {
        return;
    }
    let _ = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{group_leader_pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn terminate_process_group(_group_leader_pid: u32) {}

/// Runs `command` with `extra_args` appended, bounded by `timeout`.
///
/// The tool runs in its own process group. Timeouts kill the whole group and
/// report status 124; spawn failures report 127 with the OS error in stderr.
#[must_use]
pub fn run_tool(
    command: &ToolCommand,
    extra_args: &[&Path],
    cwd: Option<&Path>,
    timeout: Duration,
) -> ToolOutcome {
    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .args(extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        process.current_dir(cwd);
    }

    #[cfg(unix)]
    process.process_group(0);

    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(error) => {
            return ToolOutcome {
                return_code: SPAWN_FAILURE_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("failed to spawn `{}`: {error}", command.display()),
            };
        }
    };

    let stdout_reader = spawn_pipe_reader(child.stdout.take());
    let stderr_reader = spawn_pipe_reader(child.stderr.take());

    let (return_code, timed_out) = match child.wait_timeout(timeout) {
        Ok(Some(status)) => (status.code().unwrap_or(1), false),
        Ok(None) => {
            terminate_process_group(child.id());
            let _ = child.kill();
            let _ = child.wait();
            (TIMEOUT_EXIT_CODE, true)
        }
        Err(error) => {
            terminate_process_group(child.id());
            let _ = child.kill();
            let _ = child.wait();
            return ToolOutcome {
                return_code: 1,
                stdout: collect_pipe(&stdout_reader),
                stderr: format!("failed waiting for `{}`: {error}", command.display()),
            };
        }
    };
    // Descendants left behind (hardhat nodes, hung workers) would hold the
    // pipes open and outlive the stage.
    terminate_process_group(child.id());

    let stdout = collect_pipe(&stdout_reader);
    let mut stderr = collect_pipe(&stderr_reader);
    if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "solbench: `{}` timed out after {}s and was killed\n",
            command.display(),
            timeout.as_secs()
        ));
    }

    ToolOutcome {
        return_code,
        stdout,
        stderr,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub compilation: ToolOutcome,
    pub slither: ToolOutcome,
    pub testing: ToolOutcome,
}

#[derive(Debug, Clone)]
pub struct StageRunner {
    pub compiler: ToolCommand,
    pub analyzer: ToolCommand,
    pub test_runner: ToolCommand,
    pub timeout: Duration,
}

impl StageRunner {
    pub fn compile(&self, artifact: &Path) -> ToolOutcome {
        run_tool(&self.compiler, &[artifact], None, self.timeout)
    }

    pub fn analyze(&self, artifact: &Path) -> ToolOutcome {
        run_tool(&self.analyzer, &[artifact], None, self.timeout)
    }

    /// Stages the pair into the workspace, then runs the test command there.
    pub fn test(
        &self,
        artifact: &Path,
        test_source: Option<&str>,
        workspace: &mut TestWorkspace,
    ) -> Result<ToolOutcome> {
        workspace.stage(artifact, test_source)?;
        Ok(run_tool(
            &self.test_runner,
            &[],
            Some(workspace.root()),
            self.timeout,
        ))
    }

    /// Compile, analyze and test one artifact, in that order.
    pub fn verify(
        &self,
        artifact: &Path,
        test_source: Option<&str>,
        workspace: &mut TestWorkspace,
    ) -> Result<Verification> {
        let compilation = self.compile(artifact);
        let slither = self.analyze(artifact);
        let testing = self.test(artifact, test_source, workspace)?;
        Ok(Verification {
            compilation,
            slither,
            testing,
        })
    }
}

/// Result of pinning the compiler version through `solc-select`.
#[derive(Debug, Clone)]
pub struct ToolchainPreparation {
    pub selector: PathBuf,
    pub steps: Vec<(String, ToolOutcome)>,
}

impl ToolchainPreparation {
    #[must_use]
    pub fn failures(&self) -> Vec<&(String, ToolOutcome)> {
        self.steps
            .iter()
            .filter(|(_, outcome)| !outcome.succeeded())
            .collect()
    }
}

/// Runs `solc-select install <v>` then `solc-select use <v>`.
/// Returns `None` when `solc-select` is not installed.
#[must_use]
pub fn prepare_solc(version: &str, timeout: Duration) -> Option<ToolchainPreparation> {
    let selector = which::which("solc-select").ok()?;
    let mut steps = Vec::new();
    for action in ["install", "use"] {
        let command = ToolCommand {
            program: selector.display().to_string(),
            args: vec![action.to_string(), version.to_string()],
        };
        let outcome = run_tool(&command, &[], None, timeout);
        steps.push((format!("solc-select {action} {version}"), outcome));
    }
    Some(ToolchainPreparation { selector, steps })
}
