use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;

use sysrun_container::ContainerRecord;
use sysrun_core::hostname;

use crate::error::WriterError;
use crate::unc::to_unc_path;
use crate::Writer;

struct Entry {
    id: String,
    outcome: &'static str,
    output_path: String,
}

/// XML results report, written once at [`Writer::cleanup`]. The root
/// element is named `sysrunlog` rather than carrying the original project's
/// name over verbatim — see DESIGN.md's resolution of that naming question.
/// `output` attributes are rendered as UNC paths via [`to_unc_path`] so the
/// report is still useful when opened from a different host than the one
/// that produced it, matching the original's `XMLResultsWriter` behavior.
pub struct XmlWriter {
    path: PathBuf,
    host: String,
    entries: Vec<Entry>,
}

impl XmlWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            host: hostname(),
            entries: Vec::new(),
        }
    }
}

impl Writer for XmlWriter {
    fn process_result(&mut self, record: &ContainerRecord) -> Result<(), WriterError> {
        self.entries.push(Entry {
            id: record.descriptor.id.clone(),
            outcome: record.overall_outcome().label(),
            output_path: to_unc_path(&self.host, &record.output_subdir),
        });
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), WriterError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WriterError::Open { path: self.path.clone(), source })?;
        }
        let mut file = File::create(&self.path).map_err(|source| WriterError::Open { path: self.path.clone(), source })?;

        let write_err = |source| WriterError::Write { path: self.path.clone(), source };

        writeln!(file, "<?xml version=\"1.0\" encoding=\"utf-8\"?>").map_err(write_err)?;
        writeln!(file, "<sysrunlog>").map_err(write_err)?;
        writeln!(file, "  <date>{}</date>", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")).map_err(write_err)?;
        writeln!(file, "  <platform>{}</platform>", std::env::consts::OS).map_err(write_err)?;
        writeln!(file, "  <host>{}</host>", xml_escape(&self.host)).map_err(write_err)?;
        writeln!(file, "  <results>").map_err(write_err)?;
        for entry in &self.entries {
            writeln!(
                file,
                "    <result id=\"{}\" outcome=\"{}\" output=\"{}\"/>",
                xml_escape(&entry.id),
                entry.outcome,
                xml_escape(&entry.output_path),
            )
            .map_err(write_err)?;
        }
        writeln!(file, "  </results>").map_err(write_err)?;
        writeln!(file, "</sysrunlog>").map_err(write_err)?;
        Ok(())
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use sysrun_core::{Descriptor, DescriptorState, Outcome, OutcomeList};

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
            output_subdir: Path::new("/tmp/sysrun/out").to_path_buf(),
            outcomes,
            elapsed_secs: 0.1,
            log_lines: Vec::new(),
            kbrd_int: false,
        }
    }

    #[test]
    fn writes_well_formed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results.xml");
        let mut writer = XmlWriter::new(&out);
        writer.process_result(&record("t1", Outcome::Passed)).unwrap();
        writer.cleanup().unwrap();

        let contents = std::fs::read_to_string(&out).unwrap();
        assert!(contents.starts_with("<?xml"));
        assert!(contents.contains("<sysrunlog>"));
        assert!(contents.contains("id=\"t1\""));
        assert!(contents.contains("outcome=\"PASSED\""));
    }

    #[test]
    fn escapes_special_characters_in_id() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results.xml");
        let mut writer = XmlWriter::new(&out);
        writer.process_result(&record("t<1>&\"2\"", Outcome::Passed)).unwrap();
        writer.cleanup().unwrap();
        let contents = std::fs::read_to_string(&out).unwrap();
        assert!(contents.contains("t&lt;1&gt;&amp;&quot;2&quot;"));
    }
}
