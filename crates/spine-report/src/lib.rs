//! `VerifyCliOutput.v1`: the unified shape emitted by every `spine-verify`
//! entry point, plus the canonical `stableSlice` projection used to compare
//! two implementations byte-for-byte.

use serde::{Deserialize, Serialize};
use spine_canon::to_canonical_bytes;
use spine_error::{ErrorCode, ErrorEntry, SpineError};

pub const VERIFY_CLI_OUTPUT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// `non-strict` | `strict` | `fail-on-warnings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyMode {
    NonStrict,
    Strict,
    FailOnWarnings,
}

impl VerifyMode {
    pub fn is_strict(self) -> bool {
        matches!(self, VerifyMode::Strict | VerifyMode::FailOnWarnings)
    }

    pub fn promotes_warnings_to_errors(self) -> bool {
        matches!(self, VerifyMode::FailOnWarnings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Dir,
    Zip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningOut {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCliOutput {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tool: ToolInfo,
    pub mode: VerifyMode,
    pub target: Target,
    pub ok: bool,
    #[serde(rename = "verificationOk")]
    pub verification_ok: bool,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<WarningOut>,
    pub summary: String,
}

impl VerifyCliOutput {
    pub fn new(
        tool: ToolInfo,
        mode: VerifyMode,
        target: Target,
        verification_ok: bool,
        mut errors: Vec<ErrorEntry>,
        mut warnings: Vec<WarningOut>,
    ) -> Self {
        if mode.promotes_warnings_to_errors() && !warnings.is_empty() {
            errors.extend(warnings.drain(..).map(|w| ErrorEntry {
                code: w.code,
                path: w.path,
                message: format!("{} treated as error under fail-on-warnings mode", w.code),
            }));
        }
        let ok = verification_ok && errors.is_empty();
        let summary = if ok {
            "verification succeeded".to_string()
        } else {
            format!(
                "verification failed with {} error(s), {} warning(s)",
                errors.len(),
                warnings.len()
            )
        };
        Self {
            schema_version: VERIFY_CLI_OUTPUT_SCHEMA_VERSION,
            tool,
            mode,
            target,
            ok,
            verification_ok,
            errors,
            warnings,
            summary,
        }
    }

    pub fn cancelled(tool: ToolInfo, mode: VerifyMode, target: Target) -> Self {
        Self::new(
            tool,
            mode,
            target,
            false,
            vec![ErrorEntry {
                code: ErrorCode::Cancelled,
                path: None,
                message: "verification was cancelled".to_string(),
            }],
            vec![],
        )
    }

    /// Exit code per the CLI surface: 0 iff `ok`, 1 otherwise. Argument
    /// misuse (exit code 2) is decided by the caller before a report exists.
    pub fn exit_code(&self) -> i32 {
        if self.ok {
            0
        } else {
            1
        }
    }
}

/// The projection two independent implementations must render identically:
/// `{schemaVersion, tool.name, mode, target.kind, ok, verificationOk,
/// sorted(errors by path,code), sorted(warnings by path,code), summary}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StableSlice {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub mode: VerifyMode,
    #[serde(rename = "targetKind")]
    pub target_kind: TargetKind,
    pub ok: bool,
    #[serde(rename = "verificationOk")]
    pub verification_ok: bool,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<WarningOut>,
    pub summary: String,
}

fn sort_key(path: &Option<String>, code_str: &str) -> (String, String) {
    (path.clone().unwrap_or_default(), code_str.to_string())
}

pub fn stable_slice(output: &VerifyCliOutput) -> StableSlice {
    let mut errors = output.errors.clone();
    errors.sort_by(|a, b| sort_key(&a.path, a.code.as_str()).cmp(&sort_key(&b.path, b.code.as_str())));
    let mut warnings = output.warnings.clone();
    warnings.sort_by(|a, b| sort_key(&a.path, a.code.as_str()).cmp(&sort_key(&b.path, b.code.as_str())));

    StableSlice {
        schema_version: output.schema_version,
        tool_name: output.tool.name.clone(),
        mode: output.mode,
        target_kind: output.target.kind,
        ok: output.ok,
        verification_ok: output.verification_ok,
        errors,
        warnings,
        summary: output.summary.clone(),
    }
}

/// Byte-exact canonical rendering of `stableSlice(output)`, the form two
/// implementations are required to agree on.
pub fn render_stable_slice(output: &VerifyCliOutput) -> Result<Vec<u8>, SpineError> {
    let slice = stable_slice(output);
    let value = serde_json::to_value(&slice).map_err(|e| {
        SpineError::new(ErrorCode::InputInvalid, format!("failed to serialize stableSlice: {e}"))
    })?;
    to_canonical_bytes(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool() -> ToolInfo {
        ToolInfo { name: "spine-cli".into(), version: Some("0.1.0".into()), commit: None }
    }

    fn sample_target() -> Target {
        Target { kind: TargetKind::Dir, path: "/tmp/bundle".into() }
    }

    #[test]
    fn ok_output_has_empty_errors_and_ok_true() {
        let out = VerifyCliOutput::new(sample_tool(), VerifyMode::Strict, sample_target(), true, vec![], vec![]);
        assert!(out.ok);
        assert_eq!(out.exit_code(), 0);
    }

    #[test]
    fn errors_force_not_ok() {
        let out = VerifyCliOutput::new(
            sample_tool(),
            VerifyMode::Strict,
            sample_target(),
            true,
            vec![ErrorEntry { code: ErrorCode::FileHashMismatch, path: Some("a".into()), message: "x".into() }],
            vec![],
        );
        assert!(!out.ok);
        assert_eq!(out.exit_code(), 1);
    }

    #[test]
    fn fail_on_warnings_promotes_warnings_to_errors() {
        let out = VerifyCliOutput::new(
            sample_tool(),
            VerifyMode::FailOnWarnings,
            sample_target(),
            true,
            vec![],
            vec![WarningOut { code: ErrorCode::ToolVersionUnknown, path: None }],
        );
        assert!(!out.ok);
        assert_eq!(out.errors.len(), 1);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn non_strict_warnings_do_not_affect_ok() {
        let out = VerifyCliOutput::new(
            sample_tool(),
            VerifyMode::NonStrict,
            sample_target(),
            true,
            vec![],
            vec![WarningOut { code: ErrorCode::ReportMissing, path: None }],
        );
        assert!(out.ok);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn stable_slice_sorts_errors_by_path_then_code() {
        let out = VerifyCliOutput::new(
            sample_tool(),
            VerifyMode::Strict,
            sample_target(),
            true,
            vec![
                ErrorEntry { code: ErrorCode::FileHashMismatch, path: Some("z".into()), message: "1".into() },
                ErrorEntry { code: ErrorCode::FileSizeMismatch, path: Some("a".into()), message: "2".into() },
                ErrorEntry { code: ErrorCode::MissingFile, path: Some("a".into()), message: "3".into() },
            ],
            vec![],
        );
        let slice = stable_slice(&out);
        let paths: Vec<_> = slice.errors.iter().map(|e| (e.path.clone(), e.code.as_str())).collect();
        assert_eq!(
            paths,
            vec![
                (Some("a".into()), ErrorCode::FileSizeMismatch.as_str()),
                (Some("a".into()), ErrorCode::MissingFile.as_str()),
                (Some("z".into()), ErrorCode::FileHashMismatch.as_str()),
            ]
        );
    }

    #[test]
    fn render_stable_slice_is_deterministic_across_field_order() {
        let out = VerifyCliOutput::new(sample_tool(), VerifyMode::Strict, sample_target(), true, vec![], vec![]);
        let a = render_stable_slice(&out).unwrap();
        let b = render_stable_slice(&out).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cancelled_output_carries_cancelled_code_and_not_ok() {
        let out = VerifyCliOutput::cancelled(sample_tool(), VerifyMode::NonStrict, sample_target());
        assert!(!out.ok);
        assert_eq!(out.errors[0].code, ErrorCode::Cancelled);
    }
}
