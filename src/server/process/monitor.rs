//! The background reconciler (SPEC_FULL.md §4.5): a 1-second tick that
//! takes the Registry mutex, classifies every instance's observed exit
//! against policy, and applies the retry/backoff decision before the next
//! tick. Child death is observed purely by polling, so this is the single
//! observer of exit events the data model's invariants rely on.

use std::sync::Arc;
use std::time::Duration;

use tcl::error::InstanceError;

use crate::config::{AutoRestart, ProgramConfig};
use crate::process::instance::{resolve_early_exit, EarlyExitDecision, Instance};
use crate::process::registry::Registry;

/// A handle to the spawned monitor task (SPEC_FULL.md §4.7 "Monitor
/// driver"): `start`/`stop`/`reload`, the last meaning cancel-and-respawn.
pub struct MonitorHandle {
    cancel: Option<tokio::sync::oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl MonitorHandle {
    pub fn spawn(registry: Arc<Registry>) -> Self {
        let (cancel_tx, mut cancel_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            tracing::info!("monitor loop started");
            loop {
                tick(&registry).await;
                tokio::select! {
                    _ = &mut cancel_rx => {
                        tracing::info!("monitor loop cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        });
        Self {
            cancel: Some(cancel_tx),
            task,
        }
    }

    /// Cancel the loop at its next suspension point and wait for it to
    /// exit; no instance state is torn by cancellation (SPEC_FULL.md §5).
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let _ = self.task.await;
    }

    /// Cancel-and-respawn, used after a reload that added or removed a
    /// group (SPEC_FULL.md §4.6 step 6).
    pub async fn reload(self, registry: Arc<Registry>) -> Self {
        self.stop().await;
        Self::spawn(registry)
    }
}

async fn tick(registry: &Registry) {
    let mut state = registry.state.lock().await;
    for group in state.groups.values_mut() {
        let config = &group.config;
        for instance in group.instances.iter_mut() {
            classify(config, instance).await;
        }
    }
}

/// SPEC_FULL.md §4.5 `classify(instance)`.
async fn classify(config: &ProgramConfig, instance: &mut Instance) {
    if !instance.is_live() {
        // Already stopped/backoff/fatal: nothing to reconsider, avoids log spam.
        return;
    }

    let Some(code) = instance.poll_exit() else {
        return; // still actually running
    };
    instance.set_last_returncode(Some(code));

    if !instance.ever_running() {
        match resolve_early_exit(config, instance.restart_attempts_mut(), code) {
            EarlyExitDecision::Stopped => {
                tracing::info!(program = %config.name, code, "early exit with expected code, no restart");
                instance.mark_stopped();
            }
            EarlyExitDecision::Backoff => {
                tracing::error!(program = %config.name, code, "exceeded start-phase retry budget");
                instance.mark_backoff();
            }
            EarlyExitDecision::RetrySpawn => {
                tracing::warn!(program = %config.name, code, attempts = instance.restart_attempts(), "crashed early, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                spawn_until_settled(config, instance).await;
            }
        }
        return;
    }

    let expected = config.exitcodes.contains(&code);
    let should_restart = match config.autorestart {
        AutoRestart::Always => true,
        AutoRestart::Unexpected => !expected,
        AutoRestart::Never => false,
    };

    if should_restart {
        if instance.restart_attempts() < config.startretries {
            *instance.restart_attempts_mut() += 1;
            tracing::warn!(program = %config.name, code, expected, attempts = instance.restart_attempts(), "restarting");
            tokio::time::sleep(Duration::from_millis(300)).await;
            spawn_until_settled(config, instance).await;
        } else {
            tracing::error!(program = %config.name, "exceeded run-phase retry budget");
            instance.mark_backoff();
        }
    } else {
        tracing::info!(program = %config.name, code, expected, "exited, no restart");
        instance.mark_stopped();
    }
}

/// Respawn an instance and keep resolving its own outcome until it reaches
/// a terminal state or comes up live, instead of discarding the result of
/// a single `spawn()` call. Mirrors `registry::start_nolock`'s retry loop
/// (registry.rs) so a respawn that itself exits early (a flapping program)
/// converges to `Stopped`/`Backoff` rather than getting stuck at `Starting`
/// with no child to reap.
async fn spawn_until_settled(config: &ProgramConfig, instance: &mut Instance) {
    loop {
        match instance.spawn().await {
            Ok(()) => return,
            Err(InstanceError::EarlyExit { code }) => {
                match resolve_early_exit(config, instance.restart_attempts_mut(), code.unwrap_or(-1)) {
                    EarlyExitDecision::Stopped => {
                        instance.mark_stopped();
                        return;
                    }
                    EarlyExitDecision::Backoff => {
                        instance.mark_backoff();
                        return;
                    }
                    EarlyExitDecision::RetrySpawn => {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            Err(_) => return, // spawn() already left the instance in a terminal state
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::registry::start_nolock;
    use std::path::PathBuf;
    use tcl::signal::Signal;

    fn config(cmd: &str, autorestart: AutoRestart, startretries: u32) -> ProgramConfig {
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
            autorestart,
            exitcodes: vec![0],
            startretries,
            starttime: 0,
            stopsignal: Signal::Term,
            stoptime: 1,
        }
    }

    #[tokio::test]
    async fn normal_exit_with_always_restart_eventually_backs_off() {
        let cfg = config("/bin/true", AutoRestart::Always, 3);
        let mut instance = Instance::new(cfg.clone());
        instance.spawn().await.expect("true starts instantly");
        assert!(instance.ever_running());

        for _ in 0..3 {
            // give the already-exited child time to be observed.
            tokio::time::sleep(Duration::from_millis(50)).await;
            classify(&cfg, &mut instance).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        classify(&cfg, &mut instance).await;
        assert_eq!(instance.state().as_str(), "Backoff");
    }

    #[tokio::test]
    async fn classify_skips_already_terminal_instances() {
        let cfg = config("/bin/true", AutoRestart::Never, 0);
        let mut instance = Instance::new(cfg.clone());
        instance.mark_stopped();
        classify(&cfg, &mut instance).await;
        assert_eq!(instance.state().as_str(), "Stopped");
    }

    #[tokio::test]
    async fn monitor_handle_cancels_cleanly() {
        let registry = Registry::new(PathBuf::from("test.yml"));
        let handle = MonitorHandle::spawn(registry);
        handle.stop().await;
    }

    // Keep `start_nolock` imported so the retry-sharing contract between
    // registry::start and classify stays exercised from this module too.
    #[tokio::test]
    async fn early_exit_budget_matches_registry_start() {
        let cfg = config("/bin/false", AutoRestart::Unexpected, 2);
        let registry = Registry::new(PathBuf::from("test.yml"));
        {
            let mut state = registry.state.lock().await;
            state.groups.insert(
                cfg.name.clone(),
                crate::process::group::ProgramGroup::new(cfg.clone()),
            );
            start_nolock(&mut state, &cfg.name).await;
        }
        let status = registry.status().await;
        assert_eq!(status.programs["test"].states, vec!["Backoff"]);
    }
}
