//! The individual audit checks. Offline checks are pure functions over the
//! parsed entries; the registry and source checks talk to the outside world.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::model::{
    normalize_name, CheckCode, EntryKind, Finding, FindingSeverity, FreezeSnapshot, FrozenPackage,
    ManifestEntry, Requirement,
};
use crate::domain::version::Version;
use crate::utils::error::{LintError, Result};
use crate::utils::exec;

const FREEZE_TIME_LIMIT: Duration = Duration::from_secs(60);

pub fn check_syntax(entries: &[ManifestEntry]) -> Vec<Finding> {
    entries
        .iter()
        .filter_map(|entry| match &entry.kind {
            EntryKind::Invalid { reason } => Some(Finding {
                file: entry.file.clone(),
                line_no: Some(entry.line_no),
                check: CheckCode::Syntax,
                severity: FindingSeverity::Error,
                package: None,
                message: reason.clone(),
            }),
            _ => None,
        })
        .collect()
}

pub fn check_constraints(entries: &[ManifestEntry]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in entries {
        let EntryKind::Package(req) = &entry.kind else {
            continue;
        };
        for reason in &req.constraint_errors {
            findings.push(Finding {
                file: entry.file.clone(),
                line_no: Some(entry.line_no),
                check: CheckCode::Constraint,
                severity: FindingSeverity::Error,
                package: Some(req.name.clone()),
                message: format!("malformed version constraint: {}", reason),
            });
        }
    }
    findings
}

pub fn check_duplicates(entries: &[ManifestEntry]) -> Vec<Finding> {
    let mut first_seen: HashMap<String, (&str, usize)> = HashMap::new();
    let mut findings = Vec::new();

    for entry in entries {
        let EntryKind::Package(req) = &entry.kind else {
            continue;
        };
        let key = req.normalized_name();
        match first_seen.get(&key) {
            Some((file, line_no)) => findings.push(Finding {
                file: entry.file.clone(),
                line_no: Some(entry.line_no),
                check: CheckCode::Duplicate,
                severity: FindingSeverity::Warning,
                package: Some(req.name.clone()),
                message: format!("'{}' already listed at {}:{}", req.name, file, line_no),
            }),
            None => {
                first_seen.insert(key, (entry.file.as_str(), entry.line_no));
            }
        }
    }
    findings
}

/// 排除清單掃描：manifest 內的項目逐行回報，快照內的命中回報在快照來源上
pub fn check_exclusions(
    entries: &[ManifestEntry],
    excluded: &[String],
    snapshot: Option<&FreezeSnapshot>,
) -> Vec<Finding> {
    let excluded: HashSet<String> = excluded.iter().map(|name| normalize_name(name)).collect();
    if excluded.is_empty() {
        return Vec::new();
    }

    let mut findings = Vec::new();

    for entry in entries {
        let named = match &entry.kind {
            EntryKind::Package(req) => Some(req.name.clone()),
            EntryKind::Source(src) => src.egg.clone(),
            _ => None,
        };
        if let Some(name) = named {
            if excluded.contains(&normalize_name(&name)) {
                findings.push(Finding {
                    file: entry.file.clone(),
                    line_no: Some(entry.line_no),
                    check: CheckCode::Exclusion,
                    severity: FindingSeverity::Error,
                    package: Some(name.clone()),
                    message: format!("'{}' is on the exclusion list", name),
                });
            }
        }
    }

    if let Some(snapshot) = snapshot {
        for package in &snapshot.packages {
            if excluded.contains(&normalize_name(&package.name)) {
                let version = package
                    .version
                    .as_deref()
                    .map(|v| format!(" (resolved as {})", v))
                    .unwrap_or_default();
                findings.push(Finding {
                    file: snapshot.origin.clone(),
                    line_no: None,
                    check: CheckCode::Exclusion,
                    severity: FindingSeverity::Error,
                    package: Some(package.name.clone()),
                    message: format!(
                        "excluded package '{}' present in the resolved environment{}",
                        package.name, version
                    ),
                });
            }
        }
    }

    findings
}

/// `pip freeze` 輸出解析；看不懂的行直接略過
pub fn parse_freeze(content: &str, origin: &str) -> FreezeSnapshot {
    let packages = content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                return None;
            }
            match line.split_once("==") {
                Some((name, version)) => Some(FrozenPackage {
                    name: name.trim().to_string(),
                    version: Some(version.trim().to_string()),
                }),
                // `name @ url` 與裸名稱也算已安裝
                None => {
                    let name = line.split_whitespace().next()?;
                    Some(FrozenPackage {
                        name: name.trim_end_matches('@').to_string(),
                        version: None,
                    })
                }
            }
        })
        .collect();

    FreezeSnapshot {
        origin: origin.to_string(),
        packages,
    }
}

/// 透過 `python -m pip freeze` 擷取目前環境的快照
pub async fn freeze_from_environment() -> Result<FreezeSnapshot> {
    let out = exec::run_command(
        "python",
        &["-m", "pip", "freeze"],
        &[],
        None,
        FREEZE_TIME_LIMIT,
    )
    .await?;

    if !out.success() {
        return Err(LintError::ProcessError {
            command: "python -m pip freeze".to_string(),
            message: if out.timed_out {
                "timed out".to_string()
            } else {
                format!(
                    "exit code {:?}: {}",
                    out.exit_code,
                    out.stderr_lossy().trim()
                )
            },
        });
    }

    Ok(parse_freeze(&out.stdout_lossy(), "pip freeze"))
}

/// 套件索引查詢：不存在為 Error，沒有版本滿足條件為 Warning
pub async fn check_registry(
    entries: &[ManifestEntry],
    index_url: &str,
    concurrency: usize,
) -> Result<Vec<Finding>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let index = index_url.trim_end_matches('/').to_string();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut seen = HashSet::new();

    for entry in entries {
        let EntryKind::Package(req) = &entry.kind else {
            continue;
        };
        if !seen.insert(req.normalized_name()) {
            continue;
        }

        let client = client.clone();
        let index = index.clone();
        let semaphore = Arc::clone(&semaphore);
        let req = req.clone();
        let file = entry.file.clone();
        let line_no = entry.line_no;

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            query_index(&client, &index, &file, line_no, req).await
        });
    }

    let mut findings = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Some(finding)) = joined {
            findings.push(finding);
        }
    }

    // JoinSet 完成順序不定，輸出前排回 manifest 順序
    findings.sort_by(|a, b| (&a.file, a.line_no).cmp(&(&b.file, b.line_no)));
    Ok(findings)
}

async fn query_index(
    client: &Client,
    index: &str,
    file: &str,
    line_no: usize,
    req: Requirement,
) -> Option<Finding> {
    let url = format!("{}/{}/json", index, req.name);
    tracing::debug!("Querying package index: {}", url);

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            return Some(Finding {
                file: file.to_string(),
                line_no: Some(line_no),
                check: CheckCode::Registry,
                severity: FindingSeverity::Warning,
                package: Some(req.name),
                message: format!("index unreachable: {}", e),
            });
        }
    };

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Some(Finding {
            file: file.to_string(),
            line_no: Some(line_no),
            check: CheckCode::Registry,
            severity: FindingSeverity::Error,
            package: Some(req.name.clone()),
            message: format!("'{}' not found on the package index", req.name),
        });
    }

    if !response.status().is_success() {
        return Some(Finding {
            file: file.to_string(),
            line_no: Some(line_no),
            check: CheckCode::Registry,
            severity: FindingSeverity::Warning,
            package: Some(req.name.clone()),
            message: format!("index returned HTTP {}", response.status()),
        });
    }

    if req.constraints.is_empty() {
        return None;
    }

    let body: serde_json::Value = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            return Some(Finding {
                file: file.to_string(),
                line_no: Some(line_no),
                check: CheckCode::Registry,
                severity: FindingSeverity::Warning,
                package: Some(req.name),
                message: format!("unreadable index response: {}", e),
            });
        }
    };

    let satisfied = body["releases"]
        .as_object()
        .map(|releases| {
            releases.keys().any(|raw| {
                Version::parse(raw)
                    .map(|v| req.constraints.iter().all(|c| c.matches(&v)))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);

    if satisfied {
        None
    } else {
        let spec = req
            .constraints
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Some(Finding {
            file: file.to_string(),
            line_no: Some(line_no),
            check: CheckCode::Registry,
            severity: FindingSeverity::Warning,
            package: Some(req.name.clone()),
            message: format!("no published release of '{}' satisfies {}", req.name, spec),
        })
    }
}

/// `git ls-remote` 逐一驗證來源可抓取
pub async fn check_sources(entries: &[ManifestEntry], git_timeout: Duration) -> Vec<Finding> {
    let mut findings = Vec::new();

    for entry in entries {
        let EntryKind::Source(src) = &entry.kind else {
            continue;
        };

        let mut args = vec!["ls-remote", "--exit-code", src.url.as_str()];
        if let Some(reference) = &src.reference {
            args.push(reference);
        }

        tracing::debug!("Checking source: git {}", args.join(" "));
        let result = exec::run_command(
            "git",
            &args,
            &[("GIT_TERMINAL_PROMPT", "0")],
            None,
            git_timeout,
        )
        .await;

        let finding = match result {
            Err(e) => Finding {
                file: entry.file.clone(),
                line_no: Some(entry.line_no),
                check: CheckCode::Source,
                severity: FindingSeverity::Warning,
                package: src.egg.clone(),
                message: format!("source check skipped: {}", e),
            },
            Ok(out) if out.timed_out => Finding {
                file: entry.file.clone(),
                line_no: Some(entry.line_no),
                check: CheckCode::Source,
                severity: FindingSeverity::Warning,
                package: src.egg.clone(),
                message: format!("'{}' did not answer within {:?}", src.url, git_timeout),
            },
            Ok(out) if out.success() => continue,
            Ok(out) => {
                let message = if out.exit_code == Some(2) && src.reference.is_some() {
                    format!(
                        "revision '{}' not found in '{}'",
                        src.reference.as_deref().unwrap_or_default(),
                        src.url
                    )
                } else {
                    let stderr = out.stderr_lossy();
                    let detail = stderr.lines().next().unwrap_or("").trim().to_string();
                    format!("'{}' is not fetchable: {}", src.url, detail)
                };
                Finding {
                    file: entry.file.clone(),
                    line_no: Some(entry.line_no),
                    check: CheckCode::Source,
                    severity: FindingSeverity::Error,
                    package: src.egg.clone(),
                    message,
                }
            }
        };
        findings.push(finding);
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::parse_line;
    use httpmock::prelude::*;

    fn entry(file: &str, line_no: usize, raw: &str) -> ManifestEntry {
        ManifestEntry {
            file: file.to_string(),
            line_no,
            raw: raw.to_string(),
            kind: parse_line(raw).expect("non-empty line"),
        }
    }

    #[test]
    fn test_check_syntax_flags_invalid_entries() {
        let entries = vec![
            entry("r.txt", 1, "coverage >= 4.0.1"),
            entry("r.txt", 2, "-e ."),
        ];
        let findings = check_syntax(&entries);
        assert_eq!(1, findings.len());
        assert_eq!(Some(2), findings[0].line_no);
        assert_eq!(FindingSeverity::Error, findings[0].severity);
    }

    #[test]
    fn test_check_constraints_reports_each_bad_piece() {
        let entries = vec![entry("r.txt", 3, "pillow >= banana, < 7.0, == vegetable")];
        let findings = check_constraints(&entries);
        assert_eq!(2, findings.len());
        assert!(findings.iter().all(|f| f.check == CheckCode::Constraint));
        assert_eq!(Some("pillow".to_string()), findings[0].package);
    }

    #[test]
    fn test_check_duplicates_normalizes_names() {
        let entries = vec![
            entry("r.txt", 1, "scikit_learn >= 0.20"),
            entry("r.txt", 5, "Scikit-Learn"),
            entry("r.txt", 6, "pytest"),
        ];
        let findings = check_duplicates(&entries);
        assert_eq!(1, findings.len());
        assert_eq!(Some(5), findings[0].line_no);
        assert!(findings[0].message.contains("r.txt:1"));
    }

    #[test]
    fn test_check_exclusions_in_manifest() {
        let entries = vec![
            entry("r.txt", 1, "TensorFlow >= 1.0"),
            entry("r.txt", 2, "six"),
        ];
        let findings = check_exclusions(&entries, &["tensorflow".to_string()], None);
        assert_eq!(1, findings.len());
        assert_eq!(CheckCode::Exclusion, findings[0].check);
        assert_eq!(FindingSeverity::Error, findings[0].severity);
    }

    #[test]
    fn test_check_exclusions_in_snapshot() {
        let snapshot = parse_freeze("six==1.11.0\ntensorflow==1.8.0\n", "freeze.txt");
        let findings = check_exclusions(&[], &["tensorflow".to_string()], Some(&snapshot));
        assert_eq!(1, findings.len());
        assert_eq!("freeze.txt", findings[0].file);
        assert!(findings[0].line_no.is_none());
        assert!(findings[0].message.contains("1.8.0"));
    }

    #[test]
    fn test_parse_freeze_formats() {
        let snapshot = parse_freeze(
            "# via pip\nsix==1.11.0\nlocalpkg @ file:///tmp/x\n-e git+https://x/y.git#egg=z\n\n",
            "freeze.txt",
        );
        assert_eq!(2, snapshot.packages.len());
        assert_eq!("six", snapshot.packages[0].name);
        assert_eq!(Some("1.11.0".to_string()), snapshot.packages[0].version);
        assert_eq!("localpkg", snapshot.packages[1].name);
        assert!(snapshot.packages[1].version.is_none());
    }

    #[tokio::test]
    async fn test_check_registry_missing_package() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/pypi/coverage/json");
            then.status(200)
                .json_body(serde_json::json!({"releases": {"4.0.1": [], "5.0": []}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/pypi/no-such-pkg/json");
            then.status(404);
        });

        let entries = vec![
            entry("r.txt", 1, "coverage >= 4.0.1"),
            entry("r.txt", 2, "no-such-pkg"),
        ];

        let findings = check_registry(&entries, &server.url("/pypi"), 4)
            .await
            .unwrap();
        assert_eq!(1, findings.len());
        assert_eq!(Some(2), findings[0].line_no);
        assert_eq!(FindingSeverity::Error, findings[0].severity);
        assert!(findings[0].message.contains("no-such-pkg"));
    }

    #[tokio::test]
    async fn test_check_registry_unsatisfiable_constraint() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/pypi/mock/json");
            then.status(200)
                .json_body(serde_json::json!({"releases": {"1.0": [], "2.0.0": []}}));
        });

        let entries = vec![entry("r.txt", 1, "mock >= 3.0")];
        let findings = check_registry(&entries, &server.url("/pypi"), 4)
            .await
            .unwrap();
        assert_eq!(1, findings.len());
        assert_eq!(FindingSeverity::Warning, findings[0].severity);
        assert!(findings[0].message.contains(">= 3.0"));
    }

    #[tokio::test]
    async fn test_check_registry_deduplicates_names() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pypi/six/json");
            then.status(200)
                .json_body(serde_json::json!({"releases": {"1.11.0": []}}));
        });

        let entries = vec![entry("a.txt", 1, "six"), entry("b.txt", 1, "SIX")];
        let findings = check_registry(&entries, &server.url("/pypi"), 2)
            .await
            .unwrap();
        assert!(findings.is_empty());
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_check_sources_reports_unfetchable_local_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let raw = format!(
            "git+file://{}/not-a-repo",
            dir.path().display()
        );
        let entries = vec![entry("r.txt", 1, &raw)];

        let findings = check_sources(&entries, Duration::from_secs(20)).await;
        assert_eq!(1, findings.len());
        // git 不存在時降級為 Warning，存在時是 Error
        assert!(matches!(
            findings[0].severity,
            FindingSeverity::Error | FindingSeverity::Warning
        ));
    }
}
