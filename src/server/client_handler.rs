//! Per-connection request dispatch: receives a [`Request`], calls into the
//! [`Registry`]'s Lifecycle API, and sends back the [`Response`]
//! (SPEC_FULL.md §4.7 "External-facing API").

use std::path::PathBuf;
use std::sync::Arc;

use tcl::message::{receive, send, Request, Response};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::process::registry::Registry;

pub(super) struct ClientHandler;

/// The three operations that accept a `<name|all>` target.
#[derive(Clone, Copy)]
enum Verb {
    Start,
    Stop,
    Restart,
}

impl Verb {
    fn as_str(&self) -> &'static str {
        match self {
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Restart => "restart",
        }
    }

    async fn apply(&self, registry: &Registry, name: &str) -> bool {
        match self {
            Verb::Start => registry.start(name).await,
            Verb::Stop => registry.stop(name).await,
            Verb::Restart => registry.restart(name).await,
        }
    }
}

impl ClientHandler {
    pub(super) async fn handle_client(mut socket: TcpStream, registry: Arc<Registry>) {
        loop {
            match receive::<Request>(&mut socket).await {
                Ok(request) => {
                    let response = Self::dispatch(request, &registry).await;
                    if let Err(error) = send(&mut socket, &response).await {
                        tracing::error!(%error, "failed to send response");
                    }
                }
                Err(error) => {
                    if error.client_disconnected() {
                        tracing::info!("client disconnected");
                    } else {
                        tracing::error!(%error, "failed to receive request");
                    }
                    return;
                }
            }
        }
    }

    async fn dispatch(request: Request, registry: &Arc<Registry>) -> Response {
        match request {
            Request::Status => Response::Status(registry.status().await),
            Request::Start(target) => Self::apply_to_target(registry, &target, Verb::Start).await,
            Request::Stop(target) => Self::apply_to_target(registry, &target, Verb::Stop).await,
            Request::Restart(target) => Self::apply_to_target(registry, &target, Verb::Restart).await,
            Request::Reload => Self::reload(registry),
        }
    }

    /// `<name|all>` handling lives here, server-side: the client just
    /// forwards whatever the operator typed.
    async fn apply_to_target(registry: &Registry, target: &str, verb: Verb) -> Response {
        if target.eq_ignore_ascii_case("all") {
            let names = registry.program_names().await;
            if names.is_empty() {
                return Response::Error("no programs declared".to_owned());
            }
            let mut any = false;
            for name in &names {
                any |= verb.apply(registry, name).await;
            }
            return if any {
                Response::Success(format!("{}: applied to all programs", verb.as_str()))
            } else {
                Response::Error(format!("{}: no program changed state", verb.as_str()))
            };
        }

        if !registry.program_names().await.contains(&target.to_owned()) {
            return Response::Error(format!("no such program '{target}'"));
        }
        if verb.apply(registry, target).await {
            Response::Success(format!("{}: {target}", verb.as_str()))
        } else {
            Response::Error(format!("{}: {target} did not change state", verb.as_str()))
        }
    }

    /// Non-blocking per spec.md §6 ("reload" is fire-and-forget from the
    /// shell's point of view): the actual `Config::load` + `Registry::reload`
    /// transaction runs in a spawned task, and the operator gets this reply
    /// back before it's even started.
    fn reload(registry: &Arc<Registry>) -> Response {
        let registry = Arc::clone(registry);
        tokio::spawn(async move {
            let path = registry.config_path().await;
            match Config::load(&path) {
                Ok(config) => {
                    registry.reload(config, path).await;
                    tracing::info!("config reload successful");
                }
                Err(error) => {
                    tracing::error!(%error, "reload failed, registry left unchanged");
                }
            }
        });
        Response::Success("reload started".to_owned())
    }

    /// Reload driven by `SIGHUP`, against the remembered config path
    /// rather than a client-supplied one (SPEC_FULL.md §6 "Signals").
    pub(super) async fn reload_from_remembered_path(registry: &Registry, path: &PathBuf) -> bool {
        match Config::load(path) {
            Ok(config) => registry.reload(config, path.clone()).await,
            Err(error) => {
                tracing::error!(%error, path = %path.display(), "SIGHUP reload failed, registry left unchanged");
                false
            }
        }
    }
}
