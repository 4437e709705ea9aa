//! Run history series and the end-of-run report.
//!
//! The orchestrator samples four series once per sizing tick and, when
//! a drain run finishes, flushes each series plus an execution summary
//! as timestamp-labelled JSON files. Fleet size records the *target*
//! the tick decided on; what the backend eventually converged to is
//! visible in the next tick's sample.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use trawler_core::epoch_ms;

/// One sampled value, `elapsed_s` seconds into the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub value: f64,
    pub elapsed_s: u64,
}

/// Time series accumulated across decision ticks.
#[derive(Debug)]
pub struct RunHistory {
    fleet_size: Vec<SeriesPoint>,
    /// Seconds, not ms: the report reads better at chart scale.
    processing_time_s: Vec<SeriesPoint>,
    queue_depth: Vec<SeriesPoint>,
    credit_balance: Vec<SeriesPoint>,
}

#[derive(Serialize)]
struct ExecutionSummary<'a> {
    avg_service_time_ms: f64,
    avg_processing_time_ms: f64,
    processing_time_variance: f64,
    accrued_cost: f64,
    iterations: u64,
    fleet_size: &'a [SeriesPoint],
    processing_time_s: &'a [SeriesPoint],
    queue_depth: &'a [SeriesPoint],
    credit_balance: &'a [SeriesPoint],
}

impl RunHistory {
    pub fn new() -> Self {
        Self {
            fleet_size: Vec::new(),
            // both start at the origin so charts anchor at zero
            processing_time_s: vec![SeriesPoint {
                value: 0.0,
                elapsed_s: 0,
            }],
            queue_depth: vec![SeriesPoint {
                value: 0.0,
                elapsed_s: 0,
            }],
            credit_balance: Vec::new(),
        }
    }

    /// First-tick sample of what already existed before any decision.
    pub fn push_initial(&mut self, fleet_size: u32, credit_balance: Option<f64>) {
        self.fleet_size.push(SeriesPoint {
            value: fleet_size as f64,
            elapsed_s: 0,
        });
        if let Some(balance) = credit_balance {
            self.credit_balance.push(SeriesPoint {
                value: balance,
                elapsed_s: 0,
            });
        }
    }

    /// One sizing tick's sample.
    pub fn push_tick(
        &mut self,
        target_fleet_size: u32,
        avg_processing_time_ms: f64,
        queue_depth: u64,
        credit_balance: Option<f64>,
        elapsed_s: u64,
    ) {
        self.fleet_size.push(SeriesPoint {
            value: target_fleet_size as f64,
            elapsed_s,
        });
        self.processing_time_s.push(SeriesPoint {
            value: avg_processing_time_ms / 1000.0,
            elapsed_s,
        });
        self.queue_depth.push(SeriesPoint {
            value: queue_depth as f64,
            elapsed_s,
        });
        if let Some(balance) = credit_balance {
            self.credit_balance.push(SeriesPoint {
                value: balance,
                elapsed_s,
            });
        }
    }

    pub fn fleet_size(&self) -> &[SeriesPoint] {
        &self.fleet_size
    }

    pub fn queue_depth(&self) -> &[SeriesPoint] {
        &self.queue_depth
    }

    /// Population variance of the nonzero processing-time samples.
    /// Zero-valued points are chart anchors and cold-start ticks, not
    /// measurements, so they carry no weight here.
    pub fn processing_time_variance(&self) -> f64 {
        let samples: Vec<f64> = self
            .processing_time_s
            .iter()
            .map(|point| point.value)
            .filter(|value| *value > 0.0)
            .collect();
        if samples.is_empty() {
            return 0.0;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        samples
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum::<f64>()
            / n
    }

    /// Write the four series files plus the execution summary into
    /// `dir`, all sharing one timestamp label. Returns the summary
    /// path.
    pub fn flush(
        &self,
        dir: &Path,
        avg_service_time_ms: f64,
        avg_processing_time_ms: f64,
        accrued_cost: f64,
        iterations: u64,
    ) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let label = epoch_ms();

        write_series(dir, &format!("fleet_size_{label}.json"), &self.fleet_size)?;
        write_series(
            dir,
            &format!("processing_time_{label}.json"),
            &self.processing_time_s,
        )?;
        write_series(dir, &format!("queue_depth_{label}.json"), &self.queue_depth)?;
        write_series(
            dir,
            &format!("credit_balance_{label}.json"),
            &self.credit_balance,
        )?;

        let summary = ExecutionSummary {
            avg_service_time_ms,
            avg_processing_time_ms,
            processing_time_variance: self.processing_time_variance(),
            accrued_cost,
            iterations,
            fleet_size: &self.fleet_size,
            processing_time_s: &self.processing_time_s,
            queue_depth: &self.queue_depth,
            credit_balance: &self.credit_balance,
        };
        let path = dir.join(format!("execution_data_{label}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        info!(path = %path.display(), "run report flushed");
        Ok(path)
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn write_series(dir: &Path, file_name: &str, series: &[SeriesPoint]) -> anyhow::Result<()> {
    let path = dir.join(file_name);
    std::fs::write(&path, serde_json::to_string_pretty(series)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variance_ignores_zero_anchors() {
        let mut history = RunHistory::new();
        history.push_tick(1, 0.0, 10, None, 15); // cold-start tick
        history.push_tick(2, 10_000.0, 8, None, 30);
        history.push_tick(2, 20_000.0, 5, None, 45);

        // samples 10s and 20s: mean 15, variance 25
        let variance = history.processing_time_variance();
        assert!((variance - 25.0).abs() < 1e-9);
    }

    #[test]
    fn variance_of_nothing_is_zero() {
        let history = RunHistory::new();
        let variance = history.processing_time_variance();
        assert_eq!(variance, 0.0);
        assert!(variance.is_finite());
    }

    #[test]
    fn flush_writes_series_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = RunHistory::new();
        history.push_initial(1, Some(100.0));
        history.push_tick(3, 12_000.0, 40, Some(98.5), 15);

        let summary_path = history
            .flush(dir.path(), 12_000.0, 12_000.0, 0.005, 1)
            .unwrap();
        assert!(summary_path.exists());

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        for prefix in [
            "fleet_size_",
            "processing_time_",
            "queue_depth_",
            "credit_balance_",
            "execution_data_",
        ] {
            assert!(
                names.iter().any(|name| name.starts_with(prefix)),
                "missing {prefix} file in {names:?}"
            );
        }

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(summary["iterations"], 1);
        assert_eq!(summary["accrued_cost"], 0.005);
        assert_eq!(summary["fleet_size"].as_array().unwrap().len(), 2);
        // the tick recorded the target size
        assert_eq!(summary["fleet_size"][1]["value"], 3.0);
        assert_eq!(summary["processing_time_s"][1]["value"], 12.0);
    }
}
