use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::version::VersionConstraint;

/// 名稱正規化：小寫，`-`、`_`、`.` 的連續串壓成單一 `-`
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_was_sep {
                out.push('-');
            }
            last_was_sep = true;
        } else {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub constraints: Vec<VersionConstraint>,
    /// 無法解析的版本條件，保留原文供檢查回報
    pub constraint_errors: Vec<String>,
    /// `;` 之後的環境標記，原樣保存、不求值
    pub marker: Option<String>,
}

impl Requirement {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub vcs: String,
    pub url: String,
    pub reference: Option<String>,
    pub egg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryKind {
    Package(Requirement),
    Source(SourceRef),
    Include { path: String },
    Invalid { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub line_no: usize,
    pub raw: String,
    pub kind: EntryKind,
}

/// 已解析環境的套件清單（`name==version` 格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeSnapshot {
    pub origin: String,
    pub packages: Vec<FrozenPackage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenPackage {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingSeverity::Info => "info",
            FindingSeverity::Warning => "warning",
            FindingSeverity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckCode {
    Syntax,
    Constraint,
    Duplicate,
    Exclusion,
    Registry,
    Source,
}

impl fmt::Display for CheckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckCode::Syntax => "syntax",
            CheckCode::Constraint => "constraint",
            CheckCode::Duplicate => "duplicate",
            CheckCode::Exclusion => "exclusion",
            CheckCode::Registry => "registry",
            CheckCode::Source => "source",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    /// 無法對應到單一行的發現（例如凍結快照掃描）為 `None`
    pub line_no: Option<usize>,
    pub check: CheckCode,
    pub severity: FindingSeverity,
    pub package: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintSummary {
    pub files_scanned: usize,
    pub packages: usize,
    pub sources: usize,
    pub includes: usize,
    pub invalid_lines: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone)]
pub struct LintReport {
    pub findings: Vec<Finding>,
    pub summary: LintSummary,
    pub csv_output: String,
    pub json_output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!("scikit-learn", normalize_name("Scikit_Learn"));
        assert_eq!("zope-interface", normalize_name("zope.interface"));
        assert_eq!("a-b", normalize_name("a-_.b"));
        assert_eq!("pillow", normalize_name("Pillow"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(FindingSeverity::Error > FindingSeverity::Warning);
        assert!(FindingSeverity::Warning > FindingSeverity::Info);
    }

    #[test]
    fn test_entry_kind_serializes_with_tag() {
        let kind = EntryKind::Include {
            path: "requirements.txt".to_string(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!("include", json["type"]);
        assert_eq!("requirements.txt", json["path"]);
    }
}
