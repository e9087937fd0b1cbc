//! Submission file loader.
//!
//! Loads submissions from TOML or JSON files and directories, and checks
//! them for the problems a submission form would reject.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::{Stage, Submission};

/// Range of hypotheses a STEP2 form accepts.
pub const HYPOTHESIS_RANGE: std::ops::RangeInclusive<usize> = 3..=5;

/// Range of a hypothesis priority.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u32> = 1..=5;

/// A submission as stored on disk, with optional metadata.
///
/// ```toml
/// stage = "step1"
/// staff_id = "S001"
/// notice_text = "朝9時、フロアで..."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionFile {
    /// Identifier; defaults to the file stem.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub staff_id: Option<String>,
    /// When the submission was written, used to place it in a cycle.
    #[serde(default)]
    pub submitted_at: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub submission: Submission,
}

impl SubmissionFile {
    pub fn stage(&self) -> Stage {
        self.submission.stage()
    }
}

/// Format of a submission file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(FileFormat::Toml),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

/// Parse a single submission file.
pub fn load_submission(path: &Path) -> Result<SubmissionFile> {
    let format = FileFormat::from_path(path)
        .with_context(|| format!("unsupported submission file type: {}", path.display()))?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read submission file: {}", path.display()))?;

    parse_submission_str(&content, format, path)
}

/// Parse submission text (useful for testing).
pub fn parse_submission_str(
    content: &str,
    format: FileFormat,
    source_path: &Path,
) -> Result<SubmissionFile> {
    let mut file: SubmissionFile = match format {
        FileFormat::Toml => toml::from_str(content)
            .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?,
        FileFormat::Json => serde_json::from_str(content)
            .with_context(|| format!("failed to parse JSON: {}", source_path.display()))?,
    };

    if file.id.trim().is_empty() {
        file.id = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(file)
}

/// Recursively load every `.toml` and `.json` submission under `dir`,
/// sorted by path. Unreadable files are skipped with a warning.
pub fn load_submission_directory(dir: &Path) -> Result<Vec<SubmissionFile>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    collect_paths(dir, &mut paths)?;
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        match load_submission(&path) {
            Ok(file) => files.push(file),
            Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(files)
}

fn collect_paths(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_paths(&path, paths)?;
        } else if FileFormat::from_path(&path).is_some() {
            paths.push(path);
        }
    }
    Ok(())
}

/// Load a file, or every submission in a directory.
pub fn load_submissions(path: &Path) -> Result<Vec<SubmissionFile>> {
    if path.is_dir() {
        load_submission_directory(path)
    } else {
        Ok(vec![load_submission(path)?])
    }
}

/// A problem a submission form would have rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The field concerned, if any.
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

fn warning(field: impl Into<String>, message: impl Into<String>) -> ValidationWarning {
    ValidationWarning {
        field: Some(field.into()),
        message: message.into(),
    }
}

fn blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Check a submission for common issues. Grading still works on a
/// submission with warnings; it just scores lower.
pub fn validate_submission(submission: &Submission) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    match submission {
        Submission::Awareness(s) => {
            if blank(&s.notice_text) {
                warnings.push(warning("notice_text", "is empty"));
            }
            if blank(&s.target_id) {
                warnings.push(warning("target_id", "no target person selected"));
            }
        }
        Submission::Hypothesis(s) => {
            if blank(&s.change_noticed) {
                warnings.push(warning("change_noticed", "is empty"));
            }
            if !HYPOTHESIS_RANGE.contains(&s.hypotheses.len()) {
                warnings.push(warning(
                    "hypotheses",
                    format!(
                        "expected {} to {} hypotheses, found {}",
                        HYPOTHESIS_RANGE.start(),
                        HYPOTHESIS_RANGE.end(),
                        s.hypotheses.len()
                    ),
                ));
            }
            let mut seen_priorities = HashSet::new();
            for (i, h) in s.hypotheses.iter().enumerate() {
                let field = format!("hypotheses[{i}]");
                if blank(&h.why1) {
                    warnings.push(warning(format!("{field}.why1"), "is required"));
                }
                if let Some(p) = h.priority.filter(|p| *p != 0) {
                    if !PRIORITY_RANGE.contains(&p) {
                        warnings.push(warning(
                            format!("{field}.priority"),
                            format!("{p} is outside 1 to 5"),
                        ));
                    } else if !seen_priorities.insert(p) {
                        warnings.push(warning(
                            format!("{field}.priority"),
                            format!("priority {p} is used more than once"),
                        ));
                    }
                }
            }
        }
        Submission::Reflection(s) => {
            for (field, text) in [
                ("notice", &s.notice),
                ("support", &s.support),
                ("reason", &s.reason),
                ("prediction", &s.prediction),
                ("reaction", &s.reaction),
            ] {
                if blank(text) {
                    warnings.push(warning(field, "is empty"));
                }
            }
            if s.decision.is_none() {
                warnings.push(warning("decision", "choose continue, change or end"));
            }
            if blank(&s.decision_reason) {
                warnings.push(warning("decision_reason", "is empty"));
            }
        }
        Submission::CaseReport(s) => {
            if blank(&s.summary) {
                warnings.push(warning("summary", "is empty"));
            }
            for (field, present) in [
                ("has_step1", s.has_step1),
                ("has_step2", s.has_step2),
                ("has_step3", s.has_step3),
            ] {
                if !present {
                    warnings.push(warning(field, "earlier stage not included"));
                }
            }
        }
    }

    warnings
}

/// Warnings for a loaded file, including stage and id checks across a batch.
pub fn validate_files(files: &[SubmissionFile]) -> Vec<(String, ValidationWarning)> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for file in files {
        if !seen_ids.insert(file.id.as_str()) {
            warnings.push((
                file.id.clone(),
                ValidationWarning {
                    field: None,
                    message: format!("duplicate submission id: {}", file.id),
                },
            ));
        }
        for w in validate_submission(&file.submission) {
            warnings.push((file.id.clone(), w));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Decision, Hypothesis, HypothesisSubmission, ReflectionSubmission};

    const STEP1_TOML: &str = r#"
stage = "step1"
staff_id = "S001"
submitted_at = "2025-03-27T09:15:00"
target_id = "T001"
date = "2025-03-27"
notice_text = "朝9時、フロアであいさつを呼びかけたが、Aさんは視線を合わせず返答もなかった。"
"#;

    const STEP2_JSON: &str = r#"{
  "id": "hyp-1",
  "stage": "step2",
  "change_noticed": "普段は完食しているが朝食を残すようになった",
  "hypotheses": [
    {"why1": "眠れていない", "why2": "夜間に何度も起きる", "support": "夜間の巡視で記録する", "priority": 1},
    {"why1": "義歯が合わない", "why2": "", "priority": 0}
  ]
}"#;

    #[test]
    fn parse_toml_submission() {
        let file = parse_submission_str(STEP1_TOML, FileFormat::Toml, Path::new("note-01.toml"))
            .unwrap();
        assert_eq!(file.id, "note-01");
        assert_eq!(file.staff_id.as_deref(), Some("S001"));
        assert_eq!(file.stage(), Stage::Awareness);
        assert!(file.submitted_at.is_some());
        let Submission::Awareness(s) = &file.submission else {
            panic!("expected STEP1");
        };
        assert_eq!(s.target_id, "T001");
        assert!(s.date.is_some());
    }

    #[test]
    fn parse_json_submission() {
        let file =
            parse_submission_str(STEP2_JSON, FileFormat::Json, Path::new("x.json")).unwrap();
        assert_eq!(file.id, "hyp-1");
        let hypotheses = file.submission.hypotheses().unwrap();
        assert_eq!(hypotheses.len(), 2);
        assert_eq!(hypotheses[1].priority, Some(0));
    }

    #[test]
    fn unknown_stage_is_an_error() {
        let bad = "stage = \"step9\"\nnotice_text = \"x\"";
        assert!(parse_submission_str(bad, FileFormat::Toml, Path::new("bad.toml")).is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let bad = "this is not [valid toml }{";
        assert!(parse_submission_str(bad, FileFormat::Toml, Path::new("bad.toml")).is_err());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.toml")), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_path(Path::new("a.json")), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_path(Path::new("a.txt")), None);
        assert!(load_submission(Path::new("notes.txt")).is_err());
    }

    #[test]
    fn load_directory_sorted_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.toml"), STEP1_TOML).unwrap();
        std::fs::write(dir.path().join("a.json"), STEP2_JSON).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "stage = ").unwrap();
        std::fs::write(dir.path().join("readme.md"), "# notes").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.toml"), STEP1_TOML).unwrap();

        let files = load_submission_directory(dir.path()).unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["hyp-1", "b", "c"]);
    }

    #[test]
    fn load_submissions_accepts_file_or_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.toml");
        std::fs::write(&path, STEP1_TOML).unwrap();
        assert_eq!(load_submissions(&path).unwrap().len(), 1);
        assert_eq!(load_submissions(dir.path()).unwrap().len(), 1);
        assert!(load_submission_directory(&path).is_err());
    }

    #[test]
    fn validate_hypothesis_count_and_priorities() {
        let submission = Submission::Hypothesis(HypothesisSubmission {
            change_noticed: "食事量が減った".into(),
            hypotheses: vec![
                Hypothesis {
                    why1: "眠れていない".into(),
                    priority: Some(7),
                    ..Default::default()
                },
                Hypothesis {
                    why1: " ".into(),
                    priority: Some(2),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let warnings = validate_submission(&submission);
        let text: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
        assert!(text.iter().any(|w| w.contains("expected 3 to 5 hypotheses, found 2")));
        assert!(text.iter().any(|w| w.contains("hypotheses[0].priority: 7 is outside")));
        assert!(text.iter().any(|w| w.starts_with("hypotheses[1].why1")));
    }

    #[test]
    fn duplicate_priority_is_flagged() {
        let h = Hypothesis {
            why1: "理由".into(),
            priority: Some(1),
            ..Default::default()
        };
        let submission = Submission::Hypothesis(HypothesisSubmission {
            change_noticed: "変化".into(),
            hypotheses: vec![h.clone(), h.clone(), h],
            ..Default::default()
        });
        let warnings = validate_submission(&submission);
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.message.contains("more than once"))
                .count(),
            2
        );
    }

    #[test]
    fn validate_reflection_needs_a_decision() {
        let submission = Submission::Reflection(ReflectionSubmission {
            notice: "a".into(),
            support: "b".into(),
            reason: "c".into(),
            prediction: "d".into(),
            reaction: "e".into(),
            decision: None,
            decision_reason: "f".into(),
        });
        let warnings = validate_submission(&submission);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field.as_deref(), Some("decision"));

        let complete = Submission::Reflection(ReflectionSubmission {
            decision: Some(Decision::End),
            ..match submission {
                Submission::Reflection(r) => r,
                _ => unreachable!(),
            }
        });
        assert!(validate_submission(&complete).is_empty());
    }

    #[test]
    fn duplicate_ids_across_files() {
        let a = parse_submission_str(STEP1_TOML, FileFormat::Toml, Path::new("same.toml")).unwrap();
        let warnings = validate_files(&[a.clone(), a]);
        assert!(warnings
            .iter()
            .any(|(id, w)| id == "same" && w.message.contains("duplicate")));
    }
}
