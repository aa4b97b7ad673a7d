use crate::dates::DateRange;
use crate::AutomationError;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

pub const MANIFEST_FILE: &str = "backup_info.txt";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How one phase of a backup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseOutcome {
    Succeeded,
    Failed,
    /// Nothing was requested for this phase
    Skipped,
}

impl PhaseOutcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            PhaseOutcome::Succeeded
        } else {
            PhaseOutcome::Failed
        }
    }

    pub fn is_success(self) -> bool {
        self == PhaseOutcome::Succeeded
    }

    fn parse(value: &str) -> Result<Self, AutomationError> {
        match value {
            "success" => Ok(PhaseOutcome::Succeeded),
            "failure" => Ok(PhaseOutcome::Failed),
            "skipped" => Ok(PhaseOutcome::Skipped),
            other => Err(AutomationError::InvalidArgument(format!(
                "unknown phase outcome '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseOutcome::Succeeded => "success",
            PhaseOutcome::Failed => "failure",
            PhaseOutcome::Skipped => "skipped",
        })
    }
}

/// The `backup_info.txt` record left in every full backup folder.
///
/// Rendered as `key: value` lines:
///
/// ```text
/// timestamp: 2026-01-31 02:00:00
/// range: 2026-01-01 ~ 2026-01-31
/// claims: success
/// reports: failure
/// report_kinds: 월별 청구현황, 진료비 통계
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupManifest {
    pub timestamp: NaiveDateTime,
    pub range: DateRange,
    pub claims: PhaseOutcome,
    pub reports: PhaseOutcome,
    pub report_kinds: Vec<String>,
}

impl BackupManifest {
    pub fn render(&self) -> String {
        let mut out = format!(
            "timestamp: {}\nrange: {}\nclaims: {}\nreports: {}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.range,
            self.claims,
            self.reports
        );
        if !self.report_kinds.is_empty() {
            out.push_str(&format!("report_kinds: {}\n", self.report_kinds.join(", ")));
        }
        out
    }

    /// Parse a rendered manifest. Unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self, AutomationError> {
        let mut timestamp = None;
        let mut range = None;
        let mut claims = None;
        let mut reports = None;
        let mut report_kinds = Vec::new();

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "timestamp" => {
                    timestamp = Some(
                        NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|e| {
                            AutomationError::InvalidArgument(format!(
                                "invalid manifest timestamp '{value}': {e}"
                            ))
                        })?,
                    );
                }
                "range" => {
                    let (start, end) = value.split_once('~').ok_or_else(|| {
                        AutomationError::InvalidArgument(format!("invalid manifest range '{value}'"))
                    })?;
                    range = Some(DateRange::parse(start, end)?);
                }
                "claims" => claims = Some(PhaseOutcome::parse(value)?),
                "reports" => reports = Some(PhaseOutcome::parse(value)?),
                "report_kinds" => {
                    report_kinds = value
                        .split(',')
                        .map(str::trim)
                        .filter(|kind| !kind.is_empty())
                        .map(String::from)
                        .collect();
                }
                _ => {}
            }
        }

        let missing = |key: &str| AutomationError::InvalidArgument(format!("manifest is missing '{key}'"));
        Ok(Self {
            timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
            range: range.ok_or_else(|| missing("range"))?,
            claims: claims.ok_or_else(|| missing("claims"))?,
            reports: reports.ok_or_else(|| missing("reports"))?,
            report_kinds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> BackupManifest {
        BackupManifest {
            timestamp: NaiveDate::from_ymd_opt(2026, 1, 31)
                .unwrap()
                .and_hms_opt(2, 0, 0)
                .unwrap(),
            range: DateRange::month(2026, 1).unwrap(),
            claims: PhaseOutcome::Succeeded,
            reports: PhaseOutcome::Failed,
            report_kinds: vec!["월별 청구현황".to_string(), "진료비 통계".to_string()],
        }
    }

    #[test]
    fn test_render_lines() {
        let text = sample().render();
        assert_eq!(
            text,
            "timestamp: 2026-01-31 02:00:00\n\
             range: 2026-01-01 ~ 2026-01-31\n\
             claims: success\n\
             reports: failure\n\
             report_kinds: 월별 청구현황, 진료비 통계\n"
        );
    }

    #[test]
    fn test_parse_rendered_manifest() {
        let manifest = sample();
        assert_eq!(BackupManifest::parse(&manifest.render()).unwrap(), manifest);
    }

    #[test]
    fn test_parse_rejects_incomplete_manifest() {
        let err = BackupManifest::parse("timestamp: 2026-01-31 02:00:00\n").unwrap_err();
        assert!(err.to_string().contains("range"));
    }

    #[test]
    fn test_skipped_reports_without_kinds() {
        let mut manifest = sample();
        manifest.reports = PhaseOutcome::Skipped;
        manifest.report_kinds.clear();
        let text = manifest.render();
        assert!(text.contains("reports: skipped"));
        assert!(!text.contains("report_kinds"));
        assert_eq!(BackupManifest::parse(&text).unwrap(), manifest);
    }
}
