//! Progress display while the applier runs

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reconcile::{Action, ApplyObserver, Error};

/// Shows a progress bar on stderr and logs each applied action
pub struct ApplyProgress {
    bar: ProgressBar,
    hidden: bool,
}

impl ApplyProgress {
    pub fn new(quiet: bool) -> Self {
        let hidden = quiet || !console::user_attended_stderr();
        Self {
            bar: ProgressBar::hidden(),
            hidden,
        }
    }
}

impl ApplyObserver for ApplyProgress {
    fn on_start(&mut self, total: usize) {
        self.bar = ProgressBar::new(total as u64);
        if self.hidden {
            self.bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        self.bar.set_style(style);
    }

    fn on_action_start(&mut self, _index: usize, action: &Action) {
        self.bar.set_message(action.to_string());
    }

    fn on_action_complete(&mut self, _index: usize, _action: &Action) {
        self.bar.inc(1);
    }

    fn on_rollback(&mut self, error: &Error) {
        self.bar.abandon_with_message(format!("rolling back: {error}"));
    }

    fn on_finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
