// src/engine/runtime.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::types::WatchEvent;
use crate::ui::Reporter;
use crate::watch::{ChangeHashCache, Debouncer};
use crate::worker::BuildBackend;

use super::core::{CoreEvent, CoreRuntime};
use super::{CoreCommand, RuntimeEvent};

type TriggerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type TriggerFn = Box<dyn Fn(WatchEvent) -> TriggerFuture + Send + Sync>;

/// Drives the watch-mode core in response to `RuntimeEvent`s, and delegates
/// build execution to a `BuildBackend`.
///
/// This is an IO shell around `CoreRuntime`, which contains the generation
/// semantics. The shell owns the state that needs IO or timers: the change
/// hash cache, the debounce timer, the backend and the reporter.
pub struct Runtime<B: BuildBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: B,
    hashes: ChangeHashCache,
    debouncer: Debouncer<WatchEvent, TriggerFn>,
    reporter: Box<dyn Reporter>,
}

impl<B: BuildBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("hashes", &self.hashes.len())
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

impl<B: BuildBackend> Runtime<B> {
    /// `event_tx` must feed `event_rx`; the debouncer delivers its triggers
    /// through it. Must be called from within a tokio runtime.
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        backend: B,
        hashes: ChangeHashCache,
        debounce: Duration,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        let on_fire: TriggerFn = Box::new(move |change| {
            let tx = event_tx.clone();
            Box::pin(async move {
                if tx.send(RuntimeEvent::Trigger(change)).await.is_err() {
                    debug!("runtime channel closed; dropping trigger");
                }
            })
        });

        Self {
            core,
            event_rx,
            backend,
            hashes,
            debouncer: Debouncer::new(debounce, on_fire),
            reporter,
        }
    }

    /// Main event loop. Returns the process exit code.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Filters them (hash cache, stale workers) and feeds the rest into
    ///   the core runtime.
    /// - Executes commands returned by the core.
    pub async fn run(mut self) -> Result<i32> {
        info!("libpack watch runtime started");
        let mut exit_code = 0;

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let Some(core_event) = self.filter(event)? else {
                continue;
            };

            let step = self.core.step(core_event);

            for command in step.commands {
                if let Some(code) = self.execute_command(command).await? {
                    exit_code = code;
                }
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        self.debouncer.cancel();
        self.backend.shutdown().await;
        info!(exit_code, "runtime exiting");
        Ok(exit_code)
    }

    /// Translate a runtime event into a core event, or drop it.
    fn filter(&mut self, event: RuntimeEvent) -> Result<Option<CoreEvent>> {
        let core_event = match event {
            RuntimeEvent::FsChanged(change) => {
                if !self.hashes.should_rebuild(&change) {
                    return Ok(None);
                }
                CoreEvent::ChangeAccepted(change)
            }
            RuntimeEvent::Trigger(change) => CoreEvent::Trigger(change),
            RuntimeEvent::Worker { slot, msg } => {
                if !self.backend.observe(slot, &msg) {
                    return Ok(None);
                }
                CoreEvent::Worker(msg)
            }
            RuntimeEvent::WorkerExited { slot, exit } => {
                match self.backend.handle_exit(slot, &exit)? {
                    Some(message) => CoreEvent::WorkerCrashed { message },
                    None => return Ok(None),
                }
            }
            RuntimeEvent::ShutdownRequested => CoreEvent::ShutdownRequested,
        };
        Ok(Some(core_event))
    }

    /// Execute a single command from the core. Returns an exit code when
    /// the core asked to stop.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<Option<i32>> {
        match command {
            CoreCommand::Schedule(change) => {
                self.debouncer.schedule(change);
            }
            CoreCommand::TerminateActive => {
                self.backend.terminate().await?;
            }
            CoreCommand::Dispatch(request) => {
                if !self.backend.is_ready() {
                    // A dead or still-running slot is replaced before the
                    // new generation starts writing.
                    self.backend.terminate().await?;
                }
                debug!(generation = request.generation, "dispatching to backend");
                self.backend.run(request)?;
            }
            CoreCommand::Report(event) => {
                self.reporter.report(&event);
            }
            CoreCommand::Exit { code } => {
                return Ok(Some(code));
            }
        }
        Ok(None)
    }
}
