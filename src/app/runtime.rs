use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::adapters::captured_report::CapturedReportGenerator;
use crate::adapters::management_store::ManagementStore;
use crate::adapters::report_generator::{
    GeneratorError, PowercfgGenerator, ReportFormat, ReportGenerator,
};
use crate::adapters::sqlite_store::SqliteStore;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::services::{
    SchemaCreationError, SchemaOutcome, StoreWriteError, UpsertOutcome, ensure_schema,
    upsert_record,
};
use crate::domain::battery_report::{ParseError, ParsedReport, ReportShape, parse_battery_report};
use crate::domain::models::BatteryRecord;
use crate::domain::schema::BATTERY_FIELDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    EnsureSchema,
    RunGenerator,
    ParseReport,
    NormalizeDurations,
    Upsert,
    Summarize,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::EnsureSchema => "ensure_schema",
            Self::RunGenerator => "run_generator",
            Self::ParseReport => "parse_report",
            Self::NormalizeDurations => "normalize_durations",
            Self::Upsert => "upsert",
            Self::Summarize => "summarize",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Fatal outcome of a run. Work committed by earlier stages stays in place.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema provisioning failed: {0}")]
    Schema(#[source] SchemaCreationError),
    #[error("report generation failed: {0}")]
    Generator(#[source] GeneratorError),
    #[error("structured report could not be used: {0}")]
    Parse(#[source] ParseError),
    #[error("record upsert failed: {0}")]
    StoreWrite(#[source] StoreWriteError),
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Schema(_) => PipelineStage::EnsureSchema,
            Self::Generator(_) => PipelineStage::RunGenerator,
            Self::Parse(_) => PipelineStage::ParseReport,
            Self::StoreWrite(_) => PipelineStage::Upsert,
        }
    }

    /// A generator timeout may clear up on the next scheduled run.
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Generator(error) if error.is_timeout())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub namespace: String,
    pub class_name: String,
    pub report_dir: PathBuf,
    pub keep_reports: bool,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            class_name: config.class_name.clone(),
            report_dir: config.report_dir.clone(),
            keep_reports: config.keep_reports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub schema: SchemaOutcome,
    pub shape: ReportShape,
    pub outcome: UpsertOutcome,
    pub record: BatteryRecord,
}

pub struct BatteryPipeline<G, S> {
    generator: G,
    store: S,
    settings: PipelineSettings,
}

impl<G, S> BatteryPipeline<G, S>
where
    G: ReportGenerator,
    S: ManagementStore,
{
    pub fn new(generator: G, store: S, settings: PipelineSettings) -> Self {
        Self {
            generator,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn run(&self) -> Result<PipelineSummary, PipelineError> {
        tracing::info!(
            stage = %PipelineStage::Init,
            namespace = %self.settings.namespace,
            class = %self.settings.class_name,
            report_dir = %self.settings.report_dir.display(),
            "battery collection started"
        );

        let result = self.execute();

        match &result {
            Ok(_) => tracing::info!(stage = %PipelineStage::Done, "battery collection finished"),
            Err(error) => tracing::error!(
                stage = %error.stage(),
                error = %error,
                "battery collection aborted; earlier stages are not rolled back"
            ),
        }

        result
    }

    fn execute(&self) -> Result<PipelineSummary, PipelineError> {
        let schema = ensure_schema(
            &self.store,
            &self.settings.namespace,
            &self.settings.class_name,
            BATTERY_FIELDS,
        )
        .map_err(PipelineError::Schema)?;
        tracing::info!(stage = %PipelineStage::EnsureSchema, outcome = ?schema, "schema ready");

        let structured = self.generate_reports()?;

        let parsed = self.read_report(&structured);
        self.discard_report(&structured);
        let parsed = parsed?;
        tracing::info!(
            stage = %PipelineStage::ParseReport,
            shape = ?parsed.shape,
            computer_name = %parsed.computer_name,
            report_time = parsed.report_time.as_deref().unwrap_or("unknown"),
            "structured report parsed"
        );

        let record = BatteryRecord::from_parsed(&parsed);
        tracing::debug!(stage = %PipelineStage::NormalizeDurations, "durations normalized");

        let outcome = upsert_record(
            &self.store,
            &self.settings.namespace,
            &self.settings.class_name,
            &record.computer_name,
            &record.to_field_values(),
        )
        .map_err(PipelineError::StoreWrite)?;
        tracing::info!(stage = %PipelineStage::Upsert, outcome = ?outcome, "record written");

        log_summary(&record, outcome);

        Ok(PipelineSummary {
            schema,
            shape: parsed.shape,
            outcome,
            record,
        })
    }

    fn generate_reports(&self) -> Result<PathBuf, PipelineError> {
        for format in [ReportFormat::Html, ReportFormat::Xml] {
            let output = self.settings.report_dir.join(format.file_name());
            self.generator
                .generate(format, &output)
                .map_err(PipelineError::Generator)?;
            tracing::info!(
                stage = %PipelineStage::RunGenerator,
                ?format,
                output = %output.display(),
                "report generated"
            );
        }

        Ok(self.settings.report_dir.join(ReportFormat::Xml.file_name()))
    }

    fn read_report(&self, path: &Path) -> Result<ParsedReport, PipelineError> {
        let xml = std::fs::read_to_string(path)
            .map_err(|error| PipelineError::Parse(ParseError::Io(error)))?;
        parse_battery_report(&xml).map_err(PipelineError::Parse)
    }

    fn discard_report(&self, path: &Path) {
        if self.settings.keep_reports {
            return;
        }
        if let Err(error) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %error, "failed to remove structured report");
        }
    }
}

fn log_summary(record: &BatteryRecord, outcome: UpsertOutcome) {
    tracing::info!(
        stage = %PipelineStage::Summarize,
        ?outcome,
        computer_name = %record.computer_name,
        system_manufacturer = record.system_manufacturer.as_deref().unwrap_or(""),
        system_product_name = record.system_product_name.as_deref().unwrap_or(""),
        design_capacity = record.design_capacity,
        full_charge_capacity = record.full_charge_capacity,
        cycle_count = record.cycle_count,
        active_runtime = %record.active_runtime,
        active_runtime_at_design_capacity = %record.active_runtime_at_design_capacity,
        modern_standby = %record.modern_standby,
        modern_standby_at_design_capacity = %record.modern_standby_at_design_capacity,
        "battery record summary"
    );
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let store = SqliteStore::open(&config.store_path).map_err(AppError::store)?;
    let settings = PipelineSettings::from(&config);

    let result = match &config.report_source_file {
        Some(source) => {
            tracing::info!(source = %source.display(), "replaying captured structured report");
            BatteryPipeline::new(CapturedReportGenerator::new(source), store, settings).run()
        }
        None => {
            let generator = PowercfgGenerator::new(
                &config.powercfg_path,
                Duration::from_secs(config.generator_timeout_secs),
            );
            BatteryPipeline::new(generator, store, settings).run()
        }
    };

    result.map(|_| ()).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::error::Error as _;
    use std::path::{Path, PathBuf};

    use super::{BatteryPipeline, PipelineError, PipelineSettings, PipelineStage, run};
    use crate::app::AppConfig;
    use crate::adapters::report_generator::{GeneratorError, ReportFormat, ReportGenerator};
    use crate::adapters::sqlite_store::SqliteStore;
    use crate::app::services::{SchemaOutcome, UpsertOutcome};
    use crate::domain::battery_report::ParseError;
    use crate::test_support::{TEST_CLASS, TEST_NAMESPACE, open_test_store};

    struct FakeGenerator {
        xml: Option<String>,
        requested: RefCell<Vec<ReportFormat>>,
    }

    impl FakeGenerator {
        fn with_xml(xml: &str) -> Self {
            Self {
                xml: Some(xml.to_string()),
                requested: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                xml: None,
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl ReportGenerator for FakeGenerator {
        fn generate(&self, format: ReportFormat, output: &Path) -> Result<(), GeneratorError> {
            self.requested.borrow_mut().push(format);
            let body = match (format, &self.xml) {
                (_, None) => {
                    return Err(GeneratorError::NonZeroExit {
                        status: "exit status: 1".to_string(),
                        stderr: "battery not present".to_string(),
                    });
                }
                (ReportFormat::Html, Some(_)) => "<html></html>".to_string(),
                (ReportFormat::Xml, Some(xml)) => xml.clone(),
            };
            std::fs::create_dir_all(output.parent().expect("output has a parent"))?;
            std::fs::write(output, body)?;
            Ok(())
        }
    }

    fn report_xml(computer_name: Option<&str>, cycle_count: u32) -> String {
        let identity = computer_name
            .map(|name| format!("<ComputerName>{name}</ComputerName>"))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<BatteryReport xmlns="http://schemas.microsoft.com/battery/2012">
  <SystemInformation>
    {identity}
    <SystemManufacturer>LENOVO</SystemManufacturer>
    <SystemProductName>ThinkPad T14</SystemProductName>
  </SystemInformation>
  <Batteries>
    <Battery>
      <DesignCapacity>50000</DesignCapacity>
      <FullChargeCapacity>45000</FullChargeCapacity>
      <CycleCount>{cycle_count}</CycleCount>
    </Battery>
  </Batteries>
  <RuntimeEstimates>
    <FullChargeCapacity>
      <ActiveRuntime>PT5H30M</ActiveRuntime>
      <ModernStandby>P1DT2H3M4S</ModernStandby>
    </FullChargeCapacity>
  </RuntimeEstimates>
</BatteryReport>"#
        )
    }

    fn settings(report_dir: PathBuf, keep_reports: bool) -> PipelineSettings {
        PipelineSettings {
            namespace: TEST_NAMESPACE.to_string(),
            class_name: TEST_CLASS.to_string(),
            report_dir,
            keep_reports,
        }
    }

    fn record_count(store: &SqliteStore) -> usize {
        store
            .list_records(TEST_NAMESPACE, TEST_CLASS)
            .map(|records| records.len())
            .unwrap_or(0)
    }

    #[test]
    fn persists_parsed_and_normalized_record() {
        let reports = tempfile::tempdir().expect("tempdir should be created");
        let pipeline = BatteryPipeline::new(
            FakeGenerator::with_xml(&report_xml(Some("HOST-01"), 120)),
            open_test_store("pipeline-e2e"),
            settings(reports.path().to_path_buf(), false),
        );

        let summary = pipeline.run().expect("pipeline should succeed");

        assert_eq!(summary.schema, SchemaOutcome::Created);
        assert_eq!(summary.outcome, UpsertOutcome::Created);

        let records = pipeline
            .store()
            .list_records(TEST_NAMESPACE, TEST_CLASS)
            .expect("listing should work");
        assert_eq!(records.len(), 1);
        let record = crate::domain::models::BatteryRecord::from_field_values(
            &records[0].0,
            &records[0].1,
        );
        assert_eq!(record.computer_name, "HOST-01");
        assert_eq!(record.design_capacity, 50_000);
        assert_eq!(record.full_charge_capacity, 45_000);
        assert_eq!(record.cycle_count, 120);
        assert_eq!(record.active_runtime, "05:30:00");
        assert_eq!(record.modern_standby, "1:02:03:04");
        assert_eq!(record.active_runtime_at_design_capacity, "00:00:00");
        assert_eq!(record, summary.record);

        assert_eq!(
            *pipeline.generator.requested.borrow(),
            vec![ReportFormat::Html, ReportFormat::Xml]
        );
        assert!(!reports.path().join(ReportFormat::Xml.file_name()).exists());
        assert!(reports.path().join(ReportFormat::Html.file_name()).exists());
    }

    #[test]
    fn rerun_updates_existing_record_in_place() {
        let reports = tempfile::tempdir().expect("tempdir should be created");
        let store = open_test_store("pipeline-rerun");

        let first = BatteryPipeline::new(
            FakeGenerator::with_xml(&report_xml(Some("HOST-01"), 120)),
            store,
            settings(reports.path().to_path_buf(), true),
        );
        first.run().expect("first run should succeed");
        let store = first.store;

        let second = BatteryPipeline::new(
            FakeGenerator::with_xml(&report_xml(Some("HOST-01"), 130)),
            store,
            settings(reports.path().to_path_buf(), true),
        );
        let summary = second.run().expect("second run should succeed");

        assert_eq!(summary.schema, SchemaOutcome::AlreadyPresent);
        assert_eq!(summary.outcome, UpsertOutcome::Updated);
        assert_eq!(record_count(second.store()), 1);
        assert_eq!(summary.record.cycle_count, 130);
        assert!(reports.path().join(ReportFormat::Xml.file_name()).exists());
    }

    #[test]
    fn missing_identity_fails_without_writing_record() {
        let reports = tempfile::tempdir().expect("tempdir should be created");
        let pipeline = BatteryPipeline::new(
            FakeGenerator::with_xml(&report_xml(None, 120)),
            open_test_store("pipeline-no-identity"),
            settings(reports.path().to_path_buf(), false),
        );

        let error = pipeline.run().expect_err("pipeline should fail");

        assert!(matches!(
            error,
            PipelineError::Parse(ParseError::MissingRequiredField(_))
        ));
        assert_eq!(error.stage(), PipelineStage::ParseReport);
        assert_eq!(record_count(pipeline.store()), 0);
    }

    #[test]
    fn generator_failure_stops_run_but_keeps_schema() {
        let reports = tempfile::tempdir().expect("tempdir should be created");
        let pipeline = BatteryPipeline::new(
            FakeGenerator::failing(),
            open_test_store("pipeline-generator"),
            settings(reports.path().to_path_buf(), false),
        );

        let error = pipeline.run().expect_err("pipeline should fail");

        assert_eq!(error.stage(), PipelineStage::RunGenerator);
        assert!(!error.is_temporary());
        assert_eq!(*pipeline.generator.requested.borrow(), vec![ReportFormat::Html]);
        assert_eq!(record_count(pipeline.store()), 0);
        assert!(
            crate::adapters::management_store::ManagementStore::schema_fields(
                pipeline.store(),
                TEST_NAMESPACE,
                TEST_CLASS
            )
            .expect("lookup should work")
            .is_some()
        );
    }

    #[test]
    fn replays_captured_report_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let captured = dir.path().join("captured.xml");
        std::fs::write(&captured, report_xml(Some("HOST-02"), 7)).expect("capture should be written");

        let pipeline = BatteryPipeline::new(
            crate::adapters::captured_report::CapturedReportGenerator::new(&captured),
            open_test_store("pipeline-captured"),
            settings(dir.path().join("reports"), false),
        );

        let summary = pipeline.run().expect("pipeline should succeed");

        assert_eq!(summary.record.computer_name, "HOST-02");
        assert_eq!(summary.record.cycle_count, 7);
        assert!(captured.exists());
    }

    #[test]
    fn first_run_creates_store_directory() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let captured = dir.path().join("captured.xml");
        std::fs::write(&captured, report_xml(Some("HOST-03"), 12)).expect("capture should be written");
        let store_path = dir.path().join("BatteryHealth").join("battery.db");

        let config = AppConfig {
            store_path: store_path.to_string_lossy().into_owned(),
            namespace: TEST_NAMESPACE.to_string(),
            class_name: TEST_CLASS.to_string(),
            report_dir: dir.path().join("reports"),
            powercfg_path: "powercfg".to_string(),
            generator_timeout_secs: 5,
            report_source_file: Some(captured),
            keep_reports: false,
        };

        run(config).expect("first run should succeed");

        let store = SqliteStore::open_read_only(store_path.to_string_lossy().as_ref())
            .expect("store should exist after the first run");
        let records = store
            .list_records(TEST_NAMESPACE, TEST_CLASS)
            .expect("listing should work");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "HOST-03");
    }

    #[test]
    fn unreadable_report_keeps_io_error_as_source() {
        let reports = tempfile::tempdir().expect("tempdir should be created");
        let pipeline = BatteryPipeline::new(
            FakeGenerator::failing(),
            open_test_store("pipeline-unreadable"),
            settings(reports.path().to_path_buf(), false),
        );

        let error = pipeline
            .read_report(&reports.path().join("missing.xml"))
            .expect_err("missing report should fail");

        assert!(matches!(error, PipelineError::Parse(ParseError::Io(_))));
        let io = error
            .source()
            .and_then(|parse| parse.source())
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .expect("io error should be chained");
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }
}
