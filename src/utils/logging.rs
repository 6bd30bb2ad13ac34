use log::{debug, log_enabled, trace, Level};
use std::time::{Duration, Instant};

const TARGET: &str = "linkage_dynamics::timing";

/// Pipeline stages worth timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Assembly,
    Compilation,
    Integration,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Assembly => "equation assembly",
            Stage::Compilation => "state-space compilation",
            Stage::Integration => "integration",
        }
    }

    /// Unit of the work count reported by [`StageTimer::finish`].
    fn unit(&self) -> &'static str {
        match self {
            Stage::Assembly => "expression nodes",
            Stage::Compilation => "tape ops",
            Stage::Integration => "rhs evaluations",
        }
    }
}

/// Wall-clock guard around one pipeline stage.
///
/// [`StageTimer::finish`] reports the elapsed time with a work count at debug
/// level. A timer dropped without finishing marks a stage that bailed out
/// with an error and is traced as such.
pub struct StageTimer {
    stage: Stage,
    start: Instant,
    finished: bool,
}

impl StageTimer {
    pub fn start(stage: Stage) -> Self {
        trace!(target: TARGET, "{} started", stage.label());
        Self {
            stage,
            start: Instant::now(),
            finished: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn finish(mut self, work: usize) -> Duration {
        self.finished = true;
        let elapsed = self.start.elapsed();
        if log_enabled!(target: TARGET, Level::Debug) {
            debug!(
                target: TARGET,
                "{} took {:.3} ms ({work} {})",
                self.stage.label(),
                elapsed.as_secs_f64() * 1e3,
                self.stage.unit()
            );
        }
        elapsed
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        if !self.finished {
            trace!(
                target: TARGET,
                "{} abandoned after {} µs",
                self.stage.label(),
                self.start.elapsed().as_micros()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finishing_reports_elapsed_time() {
        let timer = StageTimer::start(Stage::Integration);
        assert_eq!(timer.stage(), Stage::Integration);
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.finish(10) >= Duration::from_millis(2));
    }

    #[test]
    fn stages_have_distinct_labels() {
        let labels = [Stage::Assembly, Stage::Compilation, Stage::Integration].map(|s| s.label());
        assert_ne!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
        assert_ne!(labels[0], labels[2]);
    }
}
