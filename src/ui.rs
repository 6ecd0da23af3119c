// src/ui.rs

//! Rendering of build lifecycle events: a progress bar while a generation
//! runs, a status line on every state transition.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::engine::LifecycleEvent;

/// Consumer of lifecycle events.
pub trait Reporter: Send {
    fn report(&mut self, event: &LifecycleEvent);
}

/// Terminal renderer. Status lines go to stdout, errors to stderr. With
/// `quiet` only errors are printed.
pub struct TerminalReporter {
    quiet: bool,
    bar: Option<ProgressBar>,
}

impl std::fmt::Debug for TerminalReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalReporter")
            .field("quiet", &self.quiet)
            .field("bar", &self.bar.is_some())
            .finish()
    }
}

impl TerminalReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet, bar: None }
    }

    fn start_bar(&mut self) {
        self.clear_bar();
        if self.quiet {
            return;
        }
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stdout());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
                .expect("invalid progress template")
                .progress_chars("#>-"),
        );
        self.bar = Some(bar);
    }

    fn clear_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn status(&self, line: &str) {
        if !self.quiet {
            println!("{line}");
        }
    }
}

impl Reporter for TerminalReporter {
    fn report(&mut self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Started { generation } => {
                self.clear_bar();
                self.status(&format!("libpack: build #{generation} started"));
                self.start_bar();
            }
            LifecycleEvent::Progress {
                target,
                completed,
                total,
            } => {
                if let Some(ref bar) = self.bar {
                    if let Some(target) = target {
                        bar.set_message(target.to_string());
                    }
                    bar.set_length(*total);
                    bar.set_position(*completed);
                }
            }
            LifecycleEvent::Completed {
                generation,
                elapsed,
            } => {
                self.clear_bar();
                self.status(&format!(
                    "libpack: build #{generation} completed in {:.2}s",
                    elapsed.as_secs_f64()
                ));
            }
            LifecycleEvent::Cancelled { .. } => {
                self.clear_bar();
                self.status("libpack: change detected, restarting build");
            }
            LifecycleEvent::Error { message, stack } => {
                self.clear_bar();
                eprintln!("libpack: build failed: {message}");
                if let Some(stack) = stack {
                    eprintln!("{stack}");
                }
            }
        }
    }
}

impl Drop for TerminalReporter {
    fn drop(&mut self) {
        self.clear_bar();
    }
}
