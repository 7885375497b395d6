/// Scalar summaries for training runs
///
/// Appends (step, name, value) rows to a CSV file in a per-run directory
/// and records the run configuration as JSON, so learning curves and run
/// settings survive the process.
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::TrainFlags;

/// Final bookkeeping written when a run ends
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    flags: &'a TrainFlags,
    steps: usize,
    best_accuracy: f32,
    interrupted: bool,
}

/// Scalar time-series sink keyed by (name, step)
pub struct SummaryWriter {
    run_dir: PathBuf,
    scalars: File,
}

impl SummaryWriter {
    /// Create a fresh run directory under `log_dir` and open the scalar log
    pub fn create<P: AsRef<Path>>(log_dir: P) -> crate::Result<Self> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let run_dir = log_dir.as_ref().join(format!("run_{}", stamp));
        fs::create_dir_all(&run_dir)?;

        let scalars_path = run_dir.join("scalars.csv");
        let mut scalars = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&scalars_path)?;
        writeln!(scalars, "step,name,value")?;

        log::info!("Writing summaries to {:?}", run_dir);

        Ok(Self { run_dir, scalars })
    }

    /// Append one scalar entry
    pub fn scalar(&mut self, name: &str, value: f64, step: usize) -> crate::Result<()> {
        writeln!(self.scalars, "{},{},{:.8}", step, name, value)?;
        Ok(())
    }

    /// Record the run configuration, written once at startup
    pub fn write_flags(&self, flags: &TrainFlags) -> crate::Result<()> {
        let file = File::create(self.run_dir.join("flags.json"))?;
        serde_json::to_writer_pretty(file, flags)?;
        Ok(())
    }

    /// Record the final state of the run
    pub fn write_run_summary(
        &mut self,
        flags: &TrainFlags,
        steps: usize,
        best_accuracy: f32,
        interrupted: bool,
    ) -> crate::Result<()> {
        self.scalars.flush()?;

        let summary = RunSummary {
            flags,
            steps,
            best_accuracy,
            interrupted,
        };
        let file = File::create(self.run_dir.join("run_summary.json"))?;
        serde_json::to_writer_pretty(file, &summary)?;
        Ok(())
    }

    /// Directory holding this run's files
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_rows() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = SummaryWriter::create(dir.path())?;

        writer.scalar("loss", 2.5, 100)?;
        writer.scalar("learning_rate", 1e-3, 100)?;
        writer.scalar("accuracy_test", 0.25, 308)?;
        writer.scalars.flush()?;

        let contents = fs::read_to_string(writer.run_dir().join("scalars.csv"))?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "step,name,value");
        assert!(lines[1].starts_with("100,loss,2.5"));
        assert!(lines[2].starts_with("100,learning_rate,0.001"));
        assert!(lines[3].starts_with("308,accuracy_test,0.25"));

        Ok(())
    }

    #[test]
    fn test_run_summary_round_trip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let flags = TrainFlags::default();
        let mut writer = SummaryWriter::create(dir.path())?;

        writer.write_flags(&flags)?;
        writer.write_run_summary(&flags, 1234, 0.87, true)?;

        let raw = fs::read_to_string(writer.run_dir().join("run_summary.json"))?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(parsed["steps"], 1234);
        assert_eq!(parsed["interrupted"], true);
        assert!(writer.run_dir().join("flags.json").exists());

        Ok(())
    }
}
