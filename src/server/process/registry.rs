//! The single source of truth for every declared program (SPEC_FULL.md
//! §3, §4.4): a name→[`ProgramGroup`] map behind one mutex, plus the
//! Lifecycle API's public (lock-acquiring) entry points. Internal `_nolock`
//! helpers are shared with the reload engine (`super::reload`), which
//! already holds the lock for the whole diff/apply transaction.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tcl::error::InstanceError;
use tcl::message::{ProgramStatus, StatusReport};

use crate::process::group::ProgramGroup;
use crate::process::instance::{resolve_early_exit, EarlyExitDecision};

/// Everything the Registry mutex protects.
pub(crate) struct RegistryState {
    pub(crate) groups: BTreeMap<String, ProgramGroup>,
    pub(crate) config_path: PathBuf,
    pub(crate) email: Option<serde_yaml::Value>,
}

/// `{groups, mutex, config_path, email_settings}` (SPEC_FULL.md §3). Shared
/// between the client-handler tasks and the Monitor behind an `Arc`.
pub struct Registry {
    pub(crate) state: tokio::sync::Mutex<RegistryState>,
}

pub type SharedRegistry = Arc<Registry>;

impl Registry {
    pub fn new(config_path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            state: tokio::sync::Mutex::new(RegistryState {
                groups: BTreeMap::new(),
                config_path,
                email: None,
            }),
        })
    }

    /// Populates the registry from a freshly loaded config. Only meant for
    /// the initial load at startup; later changes go through `reload`.
    pub async fn load(&self, config: crate::config::Config, config_path: PathBuf) {
        let mut state = self.state.lock().await;
        state.groups = config
            .programs
            .into_iter()
            .map(|cfg| (cfg.name.clone(), ProgramGroup::new(cfg)))
            .collect();
        state.config_path = config_path;
        state.email = config.email;
    }

    /// SPEC_FULL.md §4.4 `autostart()`.
    pub async fn autostart(&self) {
        let mut state = self.state.lock().await;
        let names: Vec<String> = state.groups.keys().cloned().collect();
        for name in names {
            let should = state.groups.get(&name).is_some_and(|g| g.config.autostart);
            if should {
                start_nolock(&mut state, &name).await;
            } else {
                tracing::debug!(program = %name, "autostart: skipping (autostart=false)");
            }
        }
    }

    /// SPEC_FULL.md §4.4 `start(name)`.
    pub async fn start(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        start_nolock(&mut state, name).await
    }

    /// SPEC_FULL.md §4.4 `stop(name)`.
    pub async fn stop(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        stop_nolock(&mut state, name).await
    }

    /// SPEC_FULL.md §4.4 `restart(name)`.
    pub async fn restart(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        stop_nolock(&mut state, name).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        start_nolock(&mut state, name).await
    }

    /// SPEC_FULL.md §4.4 `status()`.
    pub async fn status(&self) -> StatusReport {
        let state = self.state.lock().await;
        let programs = state
            .groups
            .iter()
            .map(|(name, group)| {
                let states = group.instances.iter().map(|i| i.state().as_str().to_owned()).collect();
                (
                    name.clone(),
                    ProgramStatus {
                        numprocs: group.instances.len(),
                        states,
                    },
                )
            })
            .collect();
        StatusReport { programs }
    }

    /// SPEC_FULL.md §4.4 `shutdown()`. Stops every instance and empties the
    /// group map; the Registry itself stays usable afterwards.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let names: Vec<String> = state.groups.keys().cloned().collect();
        for name in &names {
            stop_nolock(&mut state, name).await;
        }
        state.groups.clear();
        tracing::info!("registry shut down");
    }

    pub async fn config_path(&self) -> PathBuf {
        self.state.lock().await.config_path.clone()
    }

    /// Read-only access to the declared program names, for the external API
    /// (SPEC_FULL.md §4.7).
    pub async fn program_names(&self) -> Vec<String> {
        self.state.lock().await.groups.keys().cloned().collect()
    }
}

/// Internal, no-lock `start`: caller already holds `state`. Attempts each
/// not-yet-live instance up to its retry budget, one-second pause between
/// failures, sharing [`resolve_early_exit`] with the Monitor's `classify()`
/// so exactly one piece of logic decides the stopped/retry/backoff question
/// (invariant 5).
pub(crate) async fn start_nolock(state: &mut RegistryState, name: &str) -> bool {
    let Some(group) = state.groups.get_mut(name) else {
        tracing::error!(program = name, "start: no such program");
        return false;
    };

    let mut any_started = false;
    for (index, instance) in group.instances.iter_mut().enumerate() {
        if instance.is_live() {
            tracing::warn!(program = name, instance = index, "already running");
            continue;
        }

        loop {
            match instance.spawn().await {
                Ok(()) => {
                    any_started = true;
                    break;
                }
                Err(InstanceError::EarlyExit { code }) => {
                    match resolve_early_exit(instance.config(), instance.restart_attempts_mut(), code.unwrap_or(-1)) {
                        EarlyExitDecision::Stopped => {
                            instance.mark_stopped();
                            break;
                        }
                        EarlyExitDecision::Backoff => {
                            tracing::error!(program = name, instance = index, "giving up after start-phase retries");
                            instance.mark_backoff();
                            break;
                        }
                        EarlyExitDecision::RetrySpawn => {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                Err(_) => break, // Fatal / empty command: spawn() already set the terminal state.
            }
        }
    }
    any_started
}

/// Internal, no-lock `stop`: caller already holds `state`.
pub(crate) async fn stop_nolock(state: &mut RegistryState, name: &str) -> bool {
    let Some(group) = state.groups.get_mut(name) else {
        tracing::error!(program = name, "stop: no such program");
        return false;
    };

    let mut any_stopped = false;
    for instance in group.instances.iter_mut() {
        let was_live = instance.is_live();
        instance.stop().await;
        any_stopped |= was_live;
    }
    any_stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutoRestart, ProgramConfig};
    use tcl::signal::Signal;

    fn config(name: &str, cmd: &str) -> ProgramConfig {
        ProgramConfig {
            name: name.to_owned(),
            cmd: cmd.to_owned(),
            numprocs: 2,
            workingdir: None,
            umask: 0o22,
            env: Default::default(),
            stdout: None,
            stderr: None,
            user: None,
            autostart: true,
            autorestart: AutoRestart::Never,
            exitcodes: vec![0],
            startretries: 0,
            starttime: 1,
            stopsignal: Signal::Term,
            stoptime: 1,
        }
    }

    #[tokio::test]
    async fn autostart_happy_path() {
        let registry = Registry::new(PathBuf::from("test.yml"));
        registry
            .load(
                crate::config::Config {
                    programs: vec![config("web", "/bin/sleep 5")],
                    email: None,
                },
                PathBuf::from("test.yml"),
            )
            .await;
        registry.autostart().await;
        let status = registry.status().await;
        let web = &status.programs["web"];
        assert_eq!(web.numprocs, 2);
        assert_eq!(web.states, vec!["Running", "Running"]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn stop_twice_is_idempotent() {
        let registry = Registry::new(PathBuf::from("test.yml"));
        registry
            .load(
                crate::config::Config {
                    programs: vec![config("web", "/bin/sleep 5")],
                    email: None,
                },
                PathBuf::from("test.yml"),
            )
            .await;
        registry.start("web").await;
        assert!(registry.stop("web").await);
        assert!(!registry.stop("web").await);
    }

    #[tokio::test]
    async fn start_retries_then_backs_off() {
        let mut cfg = config("flaky", "/bin/false");
        cfg.startretries = 2;
        cfg.numprocs = 1;
        cfg.autorestart = AutoRestart::Unexpected;
        cfg.starttime = 0;
        let registry = Registry::new(PathBuf::from("test.yml"));
        registry
            .load(
                crate::config::Config {
                    programs: vec![cfg],
                    email: None,
                },
                PathBuf::from("test.yml"),
            )
            .await;
        assert!(!registry.start("flaky").await);
        let status = registry.status().await;
        assert_eq!(status.programs["flaky"].states, vec!["Backoff"]);
    }
}
