/// Telemetry events sent from the coordinator loop to the progress collector
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// Child process for an experiment is about to be launched
    ExperimentStarted { name: String },
    /// Experiment finished, whatever the outcome
    ExperimentFinished {
        name: String,
        succeeded: bool,
        duration_ms: u64,
    },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct SuiteStats {
    pub experiments_started: usize,
    pub experiments_finished: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_names: Vec<String>,
    pub durations_ms: Vec<u64>,
}

impl SuiteStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::ExperimentStarted { .. } => {
                self.experiments_started += 1;
            }
            TelemetryEvent::ExperimentFinished {
                name,
                succeeded,
                duration_ms,
            } => {
                self.experiments_finished += 1;
                if *succeeded {
                    self.succeeded += 1;
                } else {
                    self.failed += 1;
                    self.failed_names.push(name.clone());
                }
                self.durations_ms.push(*duration_ms);
            }
        }
    }

    /// Calculate percentile from experiment durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get median and slowest experiment duration
    pub fn duration_summary(&self) -> (Option<u64>, Option<u64>) {
        (self.percentile(50.0), self.durations_ms.iter().copied().max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(name: &str, succeeded: bool, duration_ms: u64) -> TelemetryEvent {
        TelemetryEvent::ExperimentFinished {
            name: name.to_string(),
            succeeded,
            duration_ms,
        }
    }

    #[test]
    fn test_stats_counts_outcomes() {
        let mut stats = SuiteStats::new();
        for (name, ok) in [("exp1", true), ("exp2", false), ("exp3", true)] {
            stats.update(&TelemetryEvent::ExperimentStarted {
                name: name.to_string(),
            });
            stats.update(&finished(name, ok, 10));
        }

        assert_eq!(stats.experiments_started, 3);
        assert_eq!(stats.experiments_finished, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failed_names, vec!["exp2".to_string()]);
    }

    #[test]
    fn test_percentiles() {
        let mut stats = SuiteStats::new();
        assert_eq!(stats.percentile(50.0), None);

        for ms in [40, 10, 30, 20] {
            stats.update(&finished("x", true, ms));
        }

        assert_eq!(stats.percentile(50.0), Some(20));
        assert_eq!(stats.percentile(100.0), Some(40));
        assert_eq!(stats.percentile(0.0), Some(10));
        assert_eq!(stats.duration_summary(), (Some(20), Some(40)));
    }
}
