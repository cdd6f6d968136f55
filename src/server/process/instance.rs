//! A single runnable slot derived from a [`ProgramConfig`] (SPEC_FULL.md
//! §4.2): owns one child process, knows how to spawn it with the right
//! session/umask/cwd/env/streams, detect a successful start, and stop it
//! with a graceful-then-forceful escalation.

use std::fs::OpenOptions;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, SystemTime};

use tcl::error::InstanceError;
use tcl::signal::Signal;

use crate::config::{current_username, is_privileged, AutoRestart, ProgramConfig};

/// The six states an instance can be in. Matches the program's own
/// lifecycle exactly; there is no `exited`/`unknown` catch-all here because
/// every exit is resolved into one of these six before the caller returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Backoff,
    Fatal,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Stopped => "Stopped",
            InstanceState::Starting => "Starting",
            InstanceState::Running => "Running",
            InstanceState::Stopping => "Stopping",
            InstanceState::Backoff => "Backoff",
            InstanceState::Fatal => "Fatal",
        }
    }
}

/// A `{name, state, live, pid?, last_returncode?, autorestart}` snapshot
/// (SPEC_FULL.md §4.2 "status snapshot").
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: InstanceState,
    pub live: bool,
    pub pid: Option<u32>,
    pub last_returncode: Option<i32>,
    pub autorestart: AutoRestart,
}

/// What the shared classification logic decided should happen to an
/// instance that exited before ever reaching `running` (SPEC_FULL.md §4.2
/// step 6, §4.4, §4.5 case 2). Neither `spawn()` nor `classify()` act on
/// an early exit alone; they both go through [`resolve_early_exit`] so
/// that a `stopped`/backoff decision is made in exactly one place
/// (invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyExitDecision {
    /// Expected exit code: give up, the instance is simply stopped.
    Stopped,
    /// Unexpected exit code and the retry budget is not exhausted yet.
    RetrySpawn,
    /// Unexpected exit code and the retry budget is exhausted.
    Backoff,
}

/// Decide what an early exit (one observed before `ever_running` became
/// true) means for `restart_attempts` and the instance's next state.
/// Mutates `restart_attempts` in place so callers can observe the updated
/// count regardless of which decision came back.
pub fn resolve_early_exit(
    config: &ProgramConfig,
    restart_attempts: &mut u32,
    exit_code: i32,
) -> EarlyExitDecision {
    if config.exitcodes.contains(&exit_code) {
        EarlyExitDecision::Stopped
    } else {
        *restart_attempts += 1;
        if *restart_attempts > config.startretries {
            EarlyExitDecision::Backoff
        } else {
            EarlyExitDecision::RetrySpawn
        }
    }
}

#[derive(Debug)]
pub struct Instance {
    config: ProgramConfig,
    child: Option<Child>,
    state: InstanceState,
    ever_running: bool,
    restart_attempts: u32,
    last_returncode: Option<i32>,
    started_since: Option<SystemTime>,
}

impl Instance {
    pub fn new(config: ProgramConfig) -> Self {
        Self {
            config,
            child: None,
            state: InstanceState::Stopped,
            ever_running: false,
            restart_attempts: 0,
            last_returncode: None,
            started_since: None,
        }
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn ever_running(&self) -> bool {
        self.ever_running
    }

    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts
    }

    pub fn restart_attempts_mut(&mut self) -> &mut u32 {
        &mut self.restart_attempts
    }

    /// True iff a live child is currently attached (invariant 2: this is
    /// exactly `state ∈ {starting, running, stopping}`).
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            InstanceState::Starting | InstanceState::Running | InstanceState::Stopping
        )
    }

    /// Poll the child without blocking. Returns `Some(exit_status)` once,
    /// the moment the child is observed dead; clears the child handle so a
    /// later poll does not double-report.
    fn reap_if_exited(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                Some(status)
            }
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(program = %self.config.name, %error, "failed to poll child status");
                None
            }
        }
    }

    fn exit_code_of(status: ExitStatus) -> i32 {
        status.code().unwrap_or_else(|| status.signal().unwrap_or(-1))
    }

    /// SPEC_FULL.md §4.2 `spawn()`.
    pub async fn spawn(&mut self) -> Result<(), InstanceError> {
        if self.is_live() {
            return Ok(());
        }

        if let Some(user) = self.config.user.clone() {
            let current = current_username().unwrap_or_default();
            if user != current && !is_privileged() {
                tracing::error!(
                    program = %self.config.name,
                    user = %user,
                    current = %current,
                    "cannot start: user mismatch without privilege"
                );
                self.state = InstanceState::Fatal;
                return Err(InstanceError::UserMismatch { user });
            }
        }

        let args = match shell_words::split(&self.config.cmd) {
            Ok(args) => args,
            Err(_) => {
                tracing::error!(program = %self.config.name, cmd = %self.config.cmd, "cmd has unbalanced quoting");
                self.state = InstanceState::Fatal;
                return Err(InstanceError::EmptyCommand);
            }
        };
        let Some((program, rest)) = args.split_first() else {
            self.state = InstanceState::Fatal;
            return Err(InstanceError::EmptyCommand);
        };

        let stdout = open_stream(self.config.stdout.as_deref(), &self.config.name, "stdout");
        let stderr = open_stream(self.config.stderr.as_deref(), &self.config.name, "stderr");

        let mut command = Command::new(program);
        command.args(rest);
        if let Some(dir) = &self.config.workingdir {
            if std::path::Path::new(dir).is_dir() {
                command.current_dir(dir);
            } else {
                tracing::warn!(
                    program = %self.config.name,
                    workingdir = %dir,
                    "configured workingdir does not exist, falling back to supervisor cwd"
                );
            }
        }
        command.envs(&self.config.env);
        command.stdout(stdout.map_or(Stdio::null(), Stdio::from));
        command.stderr(stderr.map_or(Stdio::null(), Stdio::from));
        command.stdin(Stdio::null());

        let umask = self.config.umask;
        unsafe {
            command.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                libc::umask(umask as libc::mode_t);
                Ok(())
            });
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                tracing::error!(program = %self.config.name, %error, "failed to spawn child");
                self.state = InstanceState::Fatal;
                return Err(InstanceError::Spawn(error));
            }
        };

        let pid = child.id();
        self.started_since = Some(SystemTime::now());
        self.state = InstanceState::Starting;
        tracing::info!(program = %self.config.name, pid, "spawned");

        tokio::time::sleep(Duration::from_secs(self.config.starttime)).await;

        match child.try_wait() {
            Ok(None) => {
                self.child = Some(child);
                self.state = InstanceState::Running;
                self.ever_running = true;
                self.restart_attempts = 0;
                tracing::info!(program = %self.config.name, pid, "running");
                Ok(())
            }
            Ok(Some(status)) => {
                let code = Self::exit_code_of(status);
                self.last_returncode = Some(code);
                tracing::warn!(program = %self.config.name, pid, code, "exited before starttime elapsed");
                // Left at `starting` deliberately: only resolve_early_exit
                // (driven by the Registry's start loop or the Monitor's
                // tick) decides whether this becomes stopped or backoff.
                Err(InstanceError::EarlyExit { code: Some(code) })
            }
            Err(error) => {
                tracing::warn!(program = %self.config.name, %error, "failed to poll child during start-up wait");
                Err(InstanceError::EarlyExit { code: None })
            }
        }
    }

    /// SPEC_FULL.md §4.2 `stop()`.
    pub async fn stop(&mut self) -> bool {
        let Some(child) = self.child.as_ref() else {
            self.state = InstanceState::Stopped;
            return false;
        };

        let pid = child.id() as libc::pid_t;
        tracing::info!(program = %self.config.name, pid, "stopping");
        self.state = InstanceState::Stopping;

        if let Err(error) = send_to_group(pid, self.config.stopsignal) {
            if error.kind() == std::io::ErrorKind::NotFound || error.raw_os_error() == Some(libc::ESRCH) {
                tracing::warn!(program = %self.config.name, pid, "process group already gone");
                self.child = None;
                self.state = InstanceState::Stopped;
                return true;
            }
            tracing::error!(program = %self.config.name, pid, %error, "failed to send stop signal");
        }

        let polls = (self.config.stoptime * 3).max(1);
        for _ in 0..polls {
            if let Some(status) = self.reap_if_exited() {
                self.last_returncode = Some(Self::exit_code_of(status));
                tracing::info!(program = %self.config.name, pid, "stopped gracefully");
                self.state = InstanceState::Stopped;
                return true;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        tracing::warn!(program = %self.config.name, pid, "grace period elapsed, sending KILL");
        if let Err(error) = send_to_group(pid, Signal::Kill) {
            tracing::error!(program = %self.config.name, pid, %error, "failed to force kill");
        }
        if let Some(child) = self.child.as_mut() {
            let _ = child.wait();
        }
        self.child = None;
        self.state = InstanceState::Stopped;
        true
    }

    /// SPEC_FULL.md §4.2 `restart()`.
    pub async fn restart(&mut self) -> Result<(), InstanceError> {
        self.stop().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.spawn().await
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            live: self.is_live(),
            pid: self.child.as_ref().map(Child::id),
            last_returncode: self.last_returncode,
            autorestart: self.config.autorestart,
        }
    }

    /// Replace this instance's `last_returncode`/`state` after the Monitor
    /// (or the Registry's own retry loop) has observed the child die and
    /// resolved the decision via [`resolve_early_exit`] or the run-phase
    /// equivalents in `classify()`.
    pub fn mark_stopped(&mut self) {
        self.child = None;
        self.state = InstanceState::Stopped;
    }

    pub fn mark_backoff(&mut self) {
        self.child = None;
        self.state = InstanceState::Backoff;
    }

    pub fn set_last_returncode(&mut self, code: Option<i32>) {
        self.last_returncode = code;
    }

    pub fn has_started_and_is_past_starttime(&self) -> bool {
        self.started_since
            .and_then(|since| SystemTime::now().duration_since(since).ok())
            .map(|elapsed| elapsed.as_secs() >= self.config.starttime)
            .unwrap_or(false)
    }

    /// Observe the child's liveness without mutating state; used by the
    /// Monitor's `classify()` which owns the state transitions itself.
    pub fn poll_exit(&mut self) -> Option<i32> {
        self.reap_if_exited().map(Self::exit_code_of)
    }
}

fn open_stream(path: Option<&str>, program: &str, kind: &str) -> Option<std::fs::File> {
    let path = path?;
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(error) => {
            tracing::warn!(program, kind, path, %error, "could not open redirect target, using null sink");
            None
        }
    }
}

/// Send `signal` to the process group led by `pid` (the child was started
/// in its own session via `setsid`, so its pgid equals its pid).
fn send_to_group(pid: libc::pid_t, signal: Signal) -> std::io::Result<()> {
    let result = unsafe { libc::kill(-pid, signal.as_libc()) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutoRestart;

    fn config_with_cmd(cmd: &str) -> ProgramConfig {
        ProgramConfig {
            name: "test".to_owned(),
            cmd: cmd.to_owned(),
            numprocs: 1,
            workingdir: None,
            umask: 0o22,
            env: Default::default(),
            stdout: None,
            stderr: None,
            user: None,
            autostart: false,
            autorestart: AutoRestart::Never,
            exitcodes: vec![0],
            startretries: 2,
            starttime: 0,
            stopsignal: Signal::Term,
            stoptime: 1,
        }
    }

    #[tokio::test]
    async fn spawn_and_observe_a_long_running_child() {
        let mut instance = Instance::new(config_with_cmd("/bin/sleep 5"));
        instance.spawn().await.expect("should start");
        assert_eq!(instance.state(), InstanceState::Running);
        assert!(instance.ever_running());
        instance.stop().await;
        assert_eq!(instance.state(), InstanceState::Stopped);
    }

    #[tokio::test]
    async fn spawn_reports_early_exit_distinctly() {
        let mut instance = Instance::new(config_with_cmd("/bin/false"));
        let error = instance.spawn().await.unwrap_err();
        assert!(matches!(error, InstanceError::EarlyExit { code: Some(1) }));
        assert!(!instance.ever_running());
        assert_eq!(instance.state(), InstanceState::Starting);
    }

    #[tokio::test]
    async fn missing_workingdir_falls_back_to_supervisor_cwd_instead_of_failing() {
        let mut config = config_with_cmd("/bin/true");
        config.workingdir = Some("/no/such/directory/ever".to_owned());
        let mut instance = Instance::new(config);
        instance.spawn().await.expect("missing workingdir should not fail the spawn");
    }

    #[tokio::test]
    async fn stdout_is_appended_to_the_configured_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("out.log");
        let mut config = config_with_cmd("/bin/echo hello");
        config.stdout = Some(log_path.to_str().unwrap().to_owned());
        config.starttime = 0;
        let mut instance = Instance::new(config);
        instance.spawn().await.unwrap_err(); // /bin/echo exits immediately: an early exit
        tokio::time::sleep(Duration::from_millis(50)).await;
        let contents = std::fs::read_to_string(&log_path).expect("log file should have been created");
        assert_eq!(contents.trim(), "hello");
    }

    #[tokio::test]
    async fn unopenable_stdout_target_falls_back_to_a_null_sink_instead_of_failing() {
        let mut config = config_with_cmd("/bin/true");
        config.stdout = Some("/no/such/directory/ever/out.log".to_owned());
        config.starttime = 0;
        let mut instance = Instance::new(config);
        // /bin/true exits immediately regardless; the point is that opening
        // the redirect target failing does not itself prevent the spawn.
        let result = instance.spawn().await;
        assert!(matches!(result, Ok(()) | Err(InstanceError::EarlyExit { .. })));
    }

    #[tokio::test]
    async fn stop_on_a_never_started_instance_is_a_no_op_success() {
        let mut instance = Instance::new(config_with_cmd("/bin/true"));
        assert!(!instance.stop().await);
        assert_eq!(instance.state(), InstanceState::Stopped);
    }

    #[test]
    fn resolve_early_exit_accepts_expected_code() {
        let config = config_with_cmd("/bin/false");
        let mut attempts = 0;
        let decision = resolve_early_exit(&config, &mut attempts, 0);
        assert_eq!(decision, EarlyExitDecision::Stopped);
        assert_eq!(attempts, 0);
    }

    #[test]
    fn resolve_early_exit_retries_then_backs_off() {
        let config = config_with_cmd("/bin/false"); // startretries = 2
        let mut attempts = 0;
        assert_eq!(resolve_early_exit(&config, &mut attempts, 1), EarlyExitDecision::RetrySpawn);
        assert_eq!(resolve_early_exit(&config, &mut attempts, 1), EarlyExitDecision::RetrySpawn);
        assert_eq!(resolve_early_exit(&config, &mut attempts, 1), EarlyExitDecision::Backoff);
        assert_eq!(attempts, 3);
    }
}
