use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "{prefix:>16} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}";

/// Live scenario bars on stderr, positioned in milliseconds of scenario time.
pub(crate) struct HumanProgress {
    multi: MultiProgress,
    // Registration order is plan order, so a Vec keeps bars stable on screen.
    bars: Mutex<Vec<(String, ProgressBar)>>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(5)),
            bars: Mutex::new(Vec::new()),
        }
    }

    fn bars(&self) -> MutexGuard<'_, Vec<(String, ProgressBar)>> {
        self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bar_for(&self, bars: &mut Vec<(String, ProgressBar)>, scenario: &str, total: Duration) -> ProgressBar {
        if let Some((_, bar)) = bars.iter().find(|(name, _)| name == scenario) {
            return bar.clone();
        }
        let bar = self.multi.add(ProgressBar::new(millis(total)));
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░"),
        );
        bar.set_prefix(scenario.to_string());
        bars.push((scenario.to_string(), bar.clone()));
        bar
    }

    pub(crate) fn register(&self, scenario: &str, total: Duration) {
        let mut bars = self.bars();
        self.bar_for(&mut bars, scenario, total);
    }

    pub(crate) fn update(&self, scenario: &str, total: Duration, elapsed: Duration, message: String) {
        let bar = {
            let mut bars = self.bars();
            self.bar_for(&mut bars, scenario, total)
        };
        let total = millis(total);
        bar.set_length(total);
        bar.set_position(millis(elapsed).min(total));
        bar.set_message(message);
    }

    /// Clears every bar so the summary prints on a clean terminal.
    pub(crate) fn finish(&self) {
        for (_, bar) in self.bars().drain(..) {
            bar.finish_and_clear();
        }
        let _ = self.multi.clear();
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
