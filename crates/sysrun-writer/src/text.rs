use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;

use sysrun_container::ContainerRecord;
use sysrun_core::{hostname, Outcome, PRECEDENCE};

use crate::error::WriterError;
use crate::Writer;

/// Plain-text results summary, one line per test, grouped by outcome in
/// precedence order (worst first) at [`Writer::cleanup`] — the direct
/// analogue of the original's `TextResultsWriter`. Kept entirely in memory
/// until `cleanup` rather than appended line-by-line, since a run can be
/// interrupted mid-cycle and the file should never show a partially-written
/// outcome group.
pub struct TextWriter {
    path: PathBuf,
    host: String,
    records: Vec<(String, Outcome, String)>,
}

impl TextWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            host: hostname(),
            records: Vec::new(),
        }
    }
}

impl Writer for TextWriter {
    fn process_result(&mut self, record: &ContainerRecord) -> Result<(), WriterError> {
        let outcome = record.overall_outcome();
        let reason = record.outcomes.overall_reason().to_string();
        self.records.push((record.descriptor.id.clone(), outcome, reason));
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), WriterError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WriterError::Open { path: self.path.clone(), source })?;
        }
        let mut file = File::create(&self.path).map_err(|source| WriterError::Open { path: self.path.clone(), source })?;

        writeln!(file, "sysrun results on {}", self.host).map_err(|source| self.write_err(source))?;
        writeln!(file, "{}", "=".repeat(40)).map_err(|source| self.write_err(source))?;

        for outcome in PRECEDENCE {
            for (id, o, reason) in &self.records {
                if *o != outcome {
                    continue;
                }
                if reason.is_empty() {
                    writeln!(file, "{}: {}", outcome.label(), id).map_err(|source| self.write_err(source))?;
                } else {
                    writeln!(file, "{}: {} ({})", outcome.label(), id, reason).map_err(|source| self.write_err(source))?;
                }
            }
        }
        Ok(())
    }
}

impl TextWriter {
    fn write_err(&self, source: std::io::Error) -> WriterError {
        WriterError::Write { path: self.path.clone(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use sysrun_core::{Descriptor, DescriptorState, OutcomeList};

    fn record(id: &str, outcome: Outcome) -> ContainerRecord {
        let mut outcomes = OutcomeList::new();
        outcomes.push(outcome, "");
        ContainerRecord {
            index: 0,
            descriptor: Descriptor {
                id: id.to_string(),
                module: "demo".into(),
                class_name: "Demo".into(),
                input: Path::new("in").to_path_buf(),
                output: Path::new("out").to_path_buf(),
                modes: vec![],
                state: DescriptorState::Runnable,
                purpose: String::new(),
                title: String::new(),
            },
            cycle: 1,
            output_subdir: Path::new("out").to_path_buf(),
            outcomes,
            elapsed_secs: 0.1,
            log_lines: Vec::new(),
            kbrd_int: false,
        }
    }

    #[test]
    fn groups_results_by_precedence_worst_first() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results.txt");
        let mut writer = TextWriter::new(&out);
        writer.process_result(&record("t1", Outcome::Passed)).unwrap();
        writer.process_result(&record("t2", Outcome::Failed)).unwrap();
        writer.cleanup().unwrap();

        let contents = std::fs::read_to_string(&out).unwrap();
        let failed_pos = contents.find("FAILED: t2").unwrap();
        let passed_pos = contents.find("PASSED: t1").unwrap();
        assert!(failed_pos < passed_pos);
    }
}
