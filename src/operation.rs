/// Operation capability consumed by the workflow orchestrator
///
/// A workflow ends in exactly one call to an injected `Operation`
/// implementation: a pure function of the ordered input list and the
/// collected parameters. Concrete transformations (combining, shrinking,
/// password protection, page extraction, format conversion) live outside
/// this crate.
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{ItemRef, OutputRef};

/// The batch operations a session can walk through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowKind {
    /// Merge several staged files into one, in staged order.
    Combine,
    /// Compress a single file.
    Shrink,
    /// Password-protect a single file.
    Protect,
    /// Remove password protection from a single file.
    Unprotect,
    /// Extract a page selection from a single file.
    ExtractPages,
    /// Convert a document or image to PDF.
    ConvertToPdf,
}

/// How many staged inputs a workflow consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArity {
    One,
    Many,
}

/// The parameters a workflow collects, in prompt order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    OutputName,
    Password,
    PageRange,
}

impl WorkflowKind {
    pub fn all() -> &'static [WorkflowKind] {
        &[
            WorkflowKind::Combine,
            WorkflowKind::Shrink,
            WorkflowKind::Protect,
            WorkflowKind::Unprotect,
            WorkflowKind::ExtractPages,
            WorkflowKind::ConvertToPdf,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkflowKind::Combine => "combine",
            WorkflowKind::Shrink => "shrink",
            WorkflowKind::Protect => "protect",
            WorkflowKind::Unprotect => "unprotect",
            WorkflowKind::ExtractPages => "extract",
            WorkflowKind::ConvertToPdf => "convert",
        }
    }

    pub fn input_arity(&self) -> InputArity {
        match self {
            WorkflowKind::Combine => InputArity::Many,
            _ => InputArity::One,
        }
    }

    /// Whether a submitted file name passes the workflow's type check.
    pub fn accepts(&self, display_name: &str) -> bool {
        let lower = display_name.to_lowercase();
        match self {
            WorkflowKind::ConvertToPdf => [
                ".doc", ".docx", ".dot", ".jpg", ".jpeg", ".png", ".gif", ".tif", ".tiff",
                ".eps", ".bmp",
            ]
            .iter()
            .any(|ext| lower.ends_with(ext)),
            _ => lower.ends_with(".pdf"),
        }
    }

    /// Parameters the workflow collects once its inputs are confirmed,
    /// prompted for one at a time.
    pub fn parameter_sequence(&self) -> &'static [ParamKind] {
        match self {
            WorkflowKind::Combine | WorkflowKind::Shrink | WorkflowKind::ConvertToPdf => {
                &[ParamKind::OutputName]
            }
            WorkflowKind::Protect | WorkflowKind::Unprotect => &[ParamKind::Password],
            WorkflowKind::ExtractPages => &[ParamKind::PageRange, ParamKind::OutputName],
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A 1-based page selection like `3-5, 7`: comma-separated single pages or
/// inclusive ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    ranges: Vec<(u32, u32)>,
}

static PAGE_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(?:-\s*(\d+)\s*)?$").expect("valid page term regex"));

impl PageSelection {
    /// Parses user text into a page selection. Accepted terms are `N` and
    /// `N-M` with `1 <= N <= M`, separated by commas.
    pub fn parse(text: &str) -> Result<Self, PageSelectionError> {
        if text.trim().is_empty() {
            return Err(PageSelectionError::Empty);
        }
        let mut ranges = Vec::new();
        for part in text.split(',') {
            let captures = PAGE_TERM
                .captures(part)
                .ok_or_else(|| PageSelectionError::Malformed(part.trim().to_string()))?;
            let start: u32 = captures[1]
                .parse()
                .map_err(|_| PageSelectionError::Malformed(part.trim().to_string()))?;
            let end: u32 = match captures.get(2) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| PageSelectionError::Malformed(part.trim().to_string()))?,
                None => start,
            };
            if start == 0 || end < start {
                return Err(PageSelectionError::InvalidRange { start, end });
            }
            ranges.push((start, end));
        }
        Ok(Self { ranges })
    }

    /// Every selected page, in selection order, duplicates preserved.
    pub fn pages(&self) -> Vec<u32> {
        self.ranges
            .iter()
            .flat_map(|&(start, end)| start..=end)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageSelectionError {
    #[error("could not understand page term `{0}`")]
    Malformed(String),

    #[error("invalid page range {start}-{end}")]
    InvalidRange { start: u32, end: u32 },

    #[error("no pages given")]
    Empty,
}

/// Parameters accumulated by a session while walking a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParams {
    pub output_name: Option<String>,
    pub password: Option<String>,
    pub pages: Option<PageSelection>,
}

/// Everything an Operation needs: the kind, the ordered inputs, and the
/// collected parameters.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: WorkflowKind,
    pub inputs: Vec<ItemRef>,
    pub params: OperationParams,
}

/// A successfully produced artifact. Byte sizes are optional; when present
/// they feed the delivery caption.
#[derive(Debug, Clone)]
pub struct OperationOutput {
    pub output: OutputRef,
    pub input_bytes: Option<u64>,
    pub output_bytes: Option<u64>,
}

#[derive(Debug, Error)]
pub enum OperationError {
    /// The inputs were rejected by the backend (wrong password, corrupt
    /// file, pages out of bounds, ...). The message is a user-presentable
    /// category, not a raw diagnostic.
    #[error("{0}")]
    Rejected(String),

    /// The backend itself failed.
    #[error("the {0} operation failed")]
    Failed(WorkflowKind),
}

#[async_trait::async_trait]
pub trait Operation: Send + Sync {
    async fn execute(&self, request: &OperationRequest) -> Result<OperationOutput, OperationError>;
}

/// Renders a byte count the way users read it: bytes, then KB, then MB,
/// then GB, one decimal.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["bytes", "KB", "MB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} GB")
}
