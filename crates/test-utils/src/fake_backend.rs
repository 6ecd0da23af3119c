use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use libpack::build::BuildRequest;
use libpack::engine::RuntimeEvent;
use libpack::errors::Result;
use libpack::types::BuildTarget;
use libpack::worker::{BuildBackend, SlotId, WorkerExit, WorkerMessage, WorkerMessageKind};

/// What the runtime asked a [`FakeBackend`] to do.
#[derive(Debug, Clone, Default)]
pub struct BackendLog {
    pub requests: Vec<BuildRequest>,
    pub terminations: usize,
    pub shutdown: bool,
}

/// A fake backend that:
/// - records requests, terminations and shutdown
/// - optionally answers every request with `Started`, per-file `Progress`
///   and `Completed` messages from its current slot.
///
/// Slot ids change on every termination, like the real pool.
pub struct FakeBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: Arc<Mutex<BackendLog>>,
    slot: SlotId,
    running: bool,
    dead: bool,
    auto_files: Option<u64>,
}

impl FakeBackend {
    /// Backend that never answers; tests inject messages themselves.
    pub fn manual(runtime_tx: mpsc::Sender<RuntimeEvent>, log: Arc<Mutex<BackendLog>>) -> Self {
        Self {
            runtime_tx,
            log,
            slot: 1,
            running: false,
            dead: false,
            auto_files: None,
        }
    }

    /// Backend that completes every build of `files` files right away.
    pub fn auto_completing(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        log: Arc<Mutex<BackendLog>>,
        files: u64,
    ) -> Self {
        Self {
            auto_files: Some(files),
            ..Self::manual(runtime_tx, log)
        }
    }

    fn reply(&self, request: &BuildRequest, files: u64) {
        let tx = self.runtime_tx.clone();
        let slot = self.slot;
        let generation = request.generation;
        let targets = if request.targets.is_empty() {
            BuildTarget::ALL.to_vec()
        } else {
            request.targets.clone()
        };

        tokio::spawn(async move {
            let mut messages = vec![WorkerMessageKind::Started {
                targets: targets.clone(),
                total: files,
            }];
            for completed in 1..=files {
                for target in &targets {
                    messages.push(WorkerMessageKind::Progress {
                        target: *target,
                        completed,
                        total: files,
                    });
                }
            }
            messages.push(WorkerMessageKind::Completed {
                files,
                elapsed: Duration::from_millis(1),
            });

            for kind in messages {
                let msg = WorkerMessage::new(generation, kind);
                if tx.send(RuntimeEvent::Worker { slot, msg }).await.is_err() {
                    return;
                }
            }
        });
    }
}

impl BuildBackend for FakeBackend {
    fn is_running(&self) -> bool {
        self.running
    }

    fn is_ready(&self) -> bool {
        !self.running && !self.dead
    }

    fn run(&mut self, request: BuildRequest) -> Result<()> {
        self.log.lock().unwrap().requests.push(request.clone());
        self.running = true;
        if let Some(files) = self.auto_files {
            self.reply(&request, files);
        }
        Ok(())
    }

    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.running || self.dead {
                self.log.lock().unwrap().terminations += 1;
                self.slot += 1;
                self.running = false;
                self.dead = false;
            }
            Ok(())
        })
    }

    fn observe(&mut self, slot: SlotId, msg: &WorkerMessage) -> bool {
        if slot != self.slot {
            return false;
        }
        if msg.kind.is_terminal() {
            self.running = false;
        }
        true
    }

    fn handle_exit(&mut self, slot: SlotId, exit: &WorkerExit) -> Result<Option<String>> {
        if slot != self.slot {
            return Ok(None);
        }
        self.dead = true;
        self.running = false;
        Ok(Some(match exit {
            WorkerExit::Clean => "worker exited unexpectedly".to_string(),
            WorkerExit::Abnormal(message) => message.clone(),
        }))
    }

    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.log.lock().unwrap().shutdown = true;
        })
    }
}
