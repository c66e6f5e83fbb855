use std::fs;
use std::path::{Path, PathBuf};

use crate::adapters::report_generator::{
    GeneratorError, ReportFormat, ReportGenerator, prepare_output, verify_output,
};

#[derive(Debug, Clone)]
pub struct CapturedReportGenerator {
    source: PathBuf,
}

impl CapturedReportGenerator {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ReportGenerator for CapturedReportGenerator {
    fn generate(&self, format: ReportFormat, output: &Path) -> Result<(), GeneratorError> {
        if !self.source.is_file() {
            return Err(GeneratorError::MissingOutput(self.source.clone()));
        }

        prepare_output(output)?;

        match format {
            ReportFormat::Xml => {
                fs::copy(&self.source, output)?;
            }
            ReportFormat::Html => {
                fs::write(
                    output,
                    format!(
                        "<!DOCTYPE html>\n<html><body><p>Battery report replayed from {}</p></body></html>\n",
                        self.source.display()
                    ),
                )?;
            }
        }

        verify_output(output)
    }
}

#[cfg(test)]
mod tests {
    use super::CapturedReportGenerator;
    use crate::adapters::report_generator::{GeneratorError, ReportFormat, ReportGenerator};

    #[test]
    fn copies_captured_document_for_structured_output() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let source = dir.path().join("captured.xml");
        std::fs::write(&source, "<BatteryReport/>").expect("source should be written");
        let output = dir.path().join("nested").join("battery-report.xml");

        CapturedReportGenerator::new(&source)
            .generate(ReportFormat::Xml, &output)
            .expect("replay should succeed");

        assert_eq!(
            std::fs::read_to_string(&output).expect("output should exist"),
            "<BatteryReport/>"
        );
    }

    #[test]
    fn writes_placeholder_for_human_readable_output() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let source = dir.path().join("captured.xml");
        std::fs::write(&source, "<BatteryReport/>").expect("source should be written");
        let output = dir.path().join("battery-report.html");

        CapturedReportGenerator::new(&source)
            .generate(ReportFormat::Html, &output)
            .expect("replay should succeed");

        let html = std::fs::read_to_string(&output).expect("output should exist");
        assert!(html.contains("captured.xml"));
    }

    #[test]
    fn fails_when_captured_document_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir should be created");

        let result = CapturedReportGenerator::new(dir.path().join("absent.xml"))
            .generate(ReportFormat::Xml, &dir.path().join("out.xml"));

        assert!(matches!(result, Err(GeneratorError::MissingOutput(_))));
    }
}
