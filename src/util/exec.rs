use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use wait_timeout::ChildExt;

/// Blocking command execution for the external collaborators (dcm2bids,
/// ANTs, the inference script, nvidia-smi).
///
/// A zero timeout waits forever; hung tools then block the whole run.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
    path_prefix: Vec<PathBuf>,
}

impl ExecService {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            path_prefix: Vec::new(),
        }
    }

    /// Directories placed in front of PATH for every spawned command.
    pub fn with_path_prefix<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.path_prefix.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// PATH value with the configured prefix dirs in front.
    pub fn search_path(&self) -> Option<OsString> {
        let current = std::env::var_os("PATH");
        if self.path_prefix.is_empty() {
            return current;
        }
        let mut dirs: Vec<PathBuf> = self.path_prefix.clone();
        if let Some(ref cur) = current {
            dirs.extend(std::env::split_paths(cur));
        }
        std::env::join_paths(dirs).ok()
    }

    /// Resolve a program against the extended search path.
    pub fn locate(&self, program: impl AsRef<OsStr>) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        which::which_in(program, self.search_path(), cwd).ok()
    }

    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let program = self
            .locate(&request.program)
            .map(PathBuf::into_os_string)
            .unwrap_or_else(|| request.program.clone());
        let mut cmd = Command::new(&program);
        cmd.args(&request.args);
        if let Some(ref cwd) = request.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(path) = self.search_path() {
            cmd.env("PATH", path);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        if request.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        tracing::debug!(program = ?request.program, args = ?request.args, "spawning");
        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {:?} with args {:?}",
                request.program, request.args
            )
        })?;

        // Drain pipes on helper threads so chatty tools cannot fill the pipe and stall.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let status = if timeout.is_zero() {
            child.wait().context("failed to wait for process")?
        } else {
            match child
                .wait_timeout(timeout)
                .context("failed to wait with timeout")?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(anyhow!(
                        "command {:?} timed out after {:?}",
                        request.program,
                        timeout
                    ));
                }
            }
        };

        let duration = started.elapsed();
        let stdout = join_reader(stdout_reader)?;
        let stderr = join_reader(stderr_reader)?;

        Ok(ExecOutput {
            status,
            duration,
            stdout,
            stderr,
        })
    }
}

type Reader = std::thread::JoinHandle<io::Result<String>>;

fn spawn_reader<R: io::Read + Send + 'static>(mut stream: R) -> Reader {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(reader: Option<Reader>) -> Result<String> {
    match reader {
        None => Ok(String::new()),
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow!("output reader thread panicked"))?
            .context("failed to read process output"),
    }
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[derive(Debug, Default)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    timeout: Option<Duration>,
    capture_output: bool,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            capture_output: true,
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }
}

#[derive(Debug)]
pub struct ExecOutput {
    pub status: std::process::ExitStatus,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty stderr line, for one-line failure messages.
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}
