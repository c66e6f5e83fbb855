use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Xml,
}

impl ReportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Html => "battery-report.html",
            Self::Xml => "battery-report.xml",
        }
    }
}

pub trait ReportGenerator {
    fn generate(&self, format: ReportFormat, output: &Path) -> Result<(), GeneratorError>;
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("failed to start report generator {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("report generator did not finish within {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },
    #[error("report generator failed with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
    #[error("report generator produced no output at {}", .0.display())]
    MissingOutput(PathBuf),
    #[error("report generator i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl GeneratorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PowercfgGenerator {
    program: PathBuf,
    timeout: Duration,
}

impl PowercfgGenerator {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn arguments(format: ReportFormat, output: &Path) -> Vec<OsString> {
        let mut arguments: Vec<OsString> = vec![
            "/batteryreport".into(),
            "/output".into(),
            output.as_os_str().to_owned(),
        ];
        if format == ReportFormat::Xml {
            arguments.push("/xml".into());
        }
        arguments
    }

    fn run(&self, arguments: &[OsString]) -> Result<(), GeneratorError> {
        let mut child = Command::new(&self.program)
            .args(arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GeneratorError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stderr_reader = child.stderr.take().map(spawn_reader);

        match await_exit(&mut child, Instant::now() + self.timeout)? {
            Exit::Finished(status) if status.success() => Ok(()),
            Exit::Finished(status) => {
                let stderr = stderr_reader
                    .and_then(|handle| handle.join().ok())
                    .unwrap_or_default();
                Err(GeneratorError::NonZeroExit {
                    status: status.to_string(),
                    stderr: stderr.trim().to_string(),
                })
            }
            Exit::TimedOut => Err(GeneratorError::TimedOut {
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

trait Supervised {
    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>>;
    fn terminate(&mut self);
}

impl Supervised for Child {
    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        self.try_wait()
    }

    fn terminate(&mut self) {
        let _ = self.kill();
        let _ = self.wait();
    }
}

enum Exit {
    Finished(ExitStatus),
    TimedOut,
}

// Every early return leaves the process killed and reaped.
fn await_exit(process: &mut impl Supervised, deadline: Instant) -> io::Result<Exit> {
    loop {
        match process.poll_exit() {
            Ok(Some(status)) => return Ok(Exit::Finished(status)),
            Ok(None) if Instant::now() >= deadline => {
                process.terminate();
                return Ok(Exit::TimedOut);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(error) => {
                process.terminate();
                return Err(error);
            }
        }
    }
}

impl ReportGenerator for PowercfgGenerator {
    fn generate(&self, format: ReportFormat, output: &Path) -> Result<(), GeneratorError> {
        prepare_output(output)?;

        let arguments = Self::arguments(format, output);
        tracing::debug!(
            program = %self.program.display(),
            output = %output.display(),
            ?format,
            "invoking report generator"
        );
        self.run(&arguments)?;

        verify_output(output)
    }
}

fn spawn_reader(mut stream: impl Read + Send + 'static) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stream.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

pub(crate) fn prepare_output(output: &Path) -> Result<(), GeneratorError> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    match fs::remove_file(output) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(GeneratorError::Io(error)),
    }
}

pub(crate) fn verify_output(output: &Path) -> Result<(), GeneratorError> {
    match fs::metadata(output) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => Ok(()),
        Ok(_) => Err(GeneratorError::MissingOutput(output.to_path_buf())),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            Err(GeneratorError::MissingOutput(output.to_path_buf()))
        }
        Err(error) => Err(GeneratorError::Io(error)),
    }
}
