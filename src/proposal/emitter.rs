//! Change-proposal buffer and emitter
//!
//! The buffer is never cleared implicitly: the same proposals may be
//! emitted to several destinations, and only [`ProposalEmitter::clear`]
//! drops them.

use crate::catalog::ProposalSink;
use crate::error::AppError;
use crate::proposal::ChangeProposalRecord;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Staged file layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON array
    Json,
    /// One JSON object per line
    Jsonl,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Json
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Jsonl => f.write_str("jsonl"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" => Ok(OutputFormat::Jsonl),
            other => Err(AppError::Config(format!(
                "Unsupported output format '{}' (expected json or jsonl)",
                other
            ))),
        }
    }
}

/// Ordered buffer of change proposals
#[derive(Debug, Default)]
pub struct ProposalEmitter {
    buffer: Vec<ChangeProposalRecord>,
    output_dir: Option<PathBuf>,
}

impl ProposalEmitter {
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self {
            buffer: Vec::new(),
            output_dir,
        }
    }

    pub fn set_output_dir(&mut self, output_dir: Option<PathBuf>) {
        self.output_dir = output_dir;
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn push(&mut self, record: ChangeProposalRecord) {
        self.buffer.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ChangeProposalRecord>) {
        self.buffer.extend(records);
    }

    pub fn records(&self) -> &[ChangeProposalRecord] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop every buffered proposal, returning how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.buffer.len();
        self.buffer.clear();
        count
    }

    /// Write the whole buffer to `<output_dir>/<filename>`
    pub async fn emit_to_file(&self, filename: &str, format: OutputFormat) -> Result<PathBuf, AppError> {
        let path = self.write_records(filename, format, &self.buffer).await?;
        info!("Emitted {} proposals to {}", self.buffer.len(), path.display());
        Ok(path)
    }

    /// Write `records` to `<output_dir>/<filename>`, creating the directory
    pub async fn write_records(
        &self,
        filename: &str,
        format: OutputFormat,
        records: &[ChangeProposalRecord],
    ) -> Result<PathBuf, AppError> {
        let dir = self.output_dir.as_ref().ok_or_else(|| {
            AppError::Config("No output directory configured for change proposals".to_string())
        })?;

        if filename.is_empty() || Path::new(filename).file_name() != Some(OsStr::new(filename)) {
            return Err(AppError::Config(format!(
                "Invalid proposal file name '{}'",
                filename
            )));
        }

        let contents = Self::serialize(records, format)?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, contents).await?;

        debug!("Wrote {} proposals as {} to {}", records.len(), format, path.display());
        Ok(path)
    }

    /// Hand the buffer to a direct-emission collaborator
    pub async fn emit_direct(&self, sink: &dyn ProposalSink) -> bool {
        match sink.emit_proposals(&self.buffer).await {
            Ok(accepted) => {
                if accepted {
                    info!("Emitted {} proposals directly", self.buffer.len());
                } else {
                    warn!("Direct emission of {} proposals was rejected", self.buffer.len());
                }
                accepted
            }
            Err(e) => {
                warn!("Direct emission failed: {}", e);
                false
            }
        }
    }

    /// Read a staged file back, in either format
    pub async fn read_file(path: &Path) -> Result<Vec<ChangeProposalRecord>, AppError> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::parse(&contents)
    }

    fn serialize(records: &[ChangeProposalRecord], format: OutputFormat) -> Result<String, AppError> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
            OutputFormat::Jsonl => {
                let mut out = String::new();
                for record in records {
                    out.push_str(&serde_json::to_string(record)?);
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }

    fn parse(contents: &str) -> Result<Vec<ChangeProposalRecord>, AppError> {
        if contents.trim_start().starts_with('[') {
            return Ok(serde_json::from_str(contents)?);
        }

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }
}
