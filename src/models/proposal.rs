//! Change-proposal models

use crate::proposal::{ChangeProposalRecord, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Request to write the buffered proposals to a file
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmitFileRequest {
    #[validate(length(min = 1, max = 255, message = "File name must be between 1 and 255 characters"))]
    pub filename: String,
    /// `json` or `jsonl`; defaults to the configured format
    pub format: Option<String>,
    /// Clear the buffer after a successful write
    #[serde(default)]
    pub clear: bool,
}

/// Request to apply the buffered proposals directly
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitDirectRequest {
    /// Clear the buffer when the batch is accepted
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalListResponse {
    pub count: usize,
    pub proposals: Vec<ChangeProposalRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitFileResponse {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub count: usize,
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitDirectResponse {
    pub accepted: bool,
    pub count: usize,
    pub cleared: bool,
}
