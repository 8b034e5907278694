use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rfpipe::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Renders stage progress as a spinner on stderr, one line per finished stage.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.disable_steady_tick();
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::StageStart { name } => {
                    pb_guard.reset();
                    pb_guard.set_style(Self::spinner_style());
                    pb_guard.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                    pb_guard.set_message(format!("Running {name}..."));
                }
                Progress::StageFinish { name, success } => {
                    pb_guard.disable_steady_tick();
                    let mark = if success { "✓" } else { "✗" };
                    pb_guard.finish_with_message(format!("{mark} {name}"));
                    *pb_guard = Self::detached_bar(&pb_guard);
                }
                Progress::Message(msg) => pb_guard.println(format!("  {}", msg)),
            }
        })
    }

    /// A fresh, finished bar drawing to the same target, so the line of the
    /// stage that just finished stays on screen.
    fn detached_bar(previous: &ProgressBar) -> ProgressBar {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message(previous.message());
        if previous.is_hidden() {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            pb.set_draw_target(ProgressDrawTarget::stderr());
        }
        pb.finish();
        pb
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .expect("Failed to create spinner style template")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
