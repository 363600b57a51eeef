use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress bars for one pool run: an overall bar plus a spinner per
/// running task. Does nothing when disabled.
pub struct ProgressMonitor {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: HashMap<String, ProgressBar>,
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(total_tasks: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                task_bars: HashMap::new(),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_tasks as u64));
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        overall.set_style(style);
        overall.set_message("starting");

        Self {
            multi,
            overall,
            task_bars: HashMap::new(),
            enabled: true,
        }
    }

    /// A requeued task adds one more unit of work.
    pub fn add_work(&self, n: u64) {
        if self.enabled {
            self.overall.inc_length(n);
        }
    }

    pub fn add_task(&mut self, base: &str, attempt: u32) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        if attempt > 0 {
            bar.set_message(format!("⏳ {base} (retry {attempt})"));
        } else {
            bar.set_message(format!("⏳ {base}"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        self.task_bars.insert(base.to_string(), bar);
    }

    pub fn complete_task(&mut self, base: &str, success: bool, duration_ms: u64) {
        if !self.enabled {
            return;
        }

        if let Some(bar) = self.task_bars.remove(base) {
            let icon = if success { "✅" } else { "❌" };
            bar.finish_with_message(format!("{icon} {base} ({duration_ms}ms)"));
        }

        self.overall.inc(1);
    }

    pub fn set_message(&self, msg: &str) {
        if self.enabled {
            self.overall.set_message(msg.to_string());
        }
    }

    pub fn finish(&self, success: bool) {
        if !self.enabled {
            return;
        }

        let msg = if success {
            "✅ all tasks finished"
        } else {
            "❌ some tasks failed"
        };
        self.overall.finish_with_message(msg.to_string());
    }

    pub fn clear(&self) {
        if self.enabled {
            self.overall.finish_and_clear();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in self.task_bars.drain() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_monitor_is_inert() {
        let mut monitor = ProgressMonitor::new(3, false);
        monitor.add_task("a.md", 0);
        monitor.complete_task("a.md", true, 100);
        monitor.add_work(1);
        monitor.set_message("x");
        monitor.finish(true);
        assert!(monitor.task_bars.is_empty());
    }

    #[test]
    fn enabled_monitor_tracks_running_tasks() {
        let mut monitor = ProgressMonitor::new(2, true);
        monitor.add_task("a.md", 0);
        monitor.add_task("b.md", 1);
        assert_eq!(monitor.task_bars.len(), 2);
        monitor.complete_task("a.md", true, 10);
        monitor.complete_task("b.md", false, 20);
        assert!(monitor.task_bars.is_empty());
        monitor.finish(false);
    }
}
