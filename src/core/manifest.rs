use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::domain::model::{EntryKind, ManifestEntry, Requirement, SourceRef};
use crate::domain::version::VersionConstraint;
use crate::utils::error::{LintError, Result};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("name regex")
});

/// Read the root manifest and every `-r` include reachable from it.
///
/// A missing or cyclic include becomes an `Invalid` entry on the include
/// line; only an unreadable root aborts the run.
pub fn load_manifest(root: &Path) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    let mut chain = Vec::new();
    walk(root, &mut chain, &mut entries)?;
    Ok(entries)
}

fn walk(path: &Path, chain: &mut Vec<PathBuf>, entries: &mut Vec<ManifestEntry>) -> Result<()> {
    let content = fs::read_to_string(path).map_err(|e| LintError::ManifestError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    chain.push(canonical);

    let display = path.display().to_string();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for (idx, line) in content.lines().enumerate() {
        let Some(kind) = parse_line(line) else {
            continue;
        };
        let line_no = idx + 1;

        if let EntryKind::Include { path: ref rel } = kind {
            let target = parent.join(rel);
            let canonical_target = fs::canonicalize(&target).unwrap_or_else(|_| target.clone());

            if chain.contains(&canonical_target) {
                entries.push(ManifestEntry {
                    file: display.clone(),
                    line_no,
                    raw: line.to_string(),
                    kind: EntryKind::Invalid {
                        reason: format!("include cycle through '{}'", rel),
                    },
                });
                continue;
            }

            entries.push(ManifestEntry {
                file: display.clone(),
                line_no,
                raw: line.to_string(),
                kind: kind.clone(),
            });

            // 被包含的檔案讀不到時，改寫成該行的 Invalid 項目
            if let Err(LintError::ManifestError { message, .. }) = walk(&target, chain, entries) {
                let entry = entries
                    .last_mut()
                    .filter(|e| e.file == display && e.line_no == line_no);
                if let Some(entry) = entry {
                    entry.kind = EntryKind::Invalid {
                        reason: format!("cannot read include '{}': {}", rel, message),
                    };
                }
            }
            continue;
        }

        entries.push(ManifestEntry {
            file: display.clone(),
            line_no,
            raw: line.to_string(),
            kind,
        });
    }

    chain.pop();
    Ok(())
}

/// Parse one manifest line. Blank lines and comments yield `None`.
pub fn parse_line(raw: &str) -> Option<EntryKind> {
    let stripped = strip_inline_comment(raw);
    let line = stripped.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line
        .strip_prefix("-r")
        .filter(|r| r.starts_with(char::is_whitespace))
        .or_else(|| {
            line.strip_prefix("--requirement")
                .filter(|r| r.starts_with(char::is_whitespace))
        })
    {
        let path = rest.trim();
        if path.is_empty() {
            return Some(EntryKind::Invalid {
                reason: "include directive without a path".to_string(),
            });
        }
        return Some(EntryKind::Include {
            path: path.to_string(),
        });
    }

    if line.starts_with('-') {
        return Some(EntryKind::Invalid {
            reason: format!("unsupported directive: '{}'", line.split_whitespace().next().unwrap_or(line)),
        });
    }

    if let Some(rest) = line.strip_prefix("git+") {
        return Some(parse_source(rest));
    }

    for vcs in ["hg+", "svn+", "bzr+"] {
        if line.starts_with(vcs) {
            return Some(EntryKind::Invalid {
                reason: format!("unsupported VCS scheme: '{}'", vcs.trim_end_matches('+')),
            });
        }
    }

    Some(parse_requirement(line))
}

// 行內註解：`#` 前面必須是空白（或在行首）
fn strip_inline_comment(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &raw[..i];
        }
    }
    raw
}

/// `<url>[@<rev>][#egg=<name>]`，`git+` 已去除
fn parse_source(rest: &str) -> EntryKind {
    let (without_fragment, egg) = match rest.split_once('#') {
        Some((head, fragment)) => {
            let egg = fragment.strip_prefix("egg=").map(str::to_string);
            if egg.is_none() {
                return EntryKind::Invalid {
                    reason: format!("unrecognized fragment: '#{}'", fragment),
                };
            }
            (head, egg)
        }
        None => (rest, None),
    };

    // rev 是最後一個路徑段之後的 @，避免誤判 ssh://git@host
    let (url_part, reference) = match without_fragment.rfind('/') {
        Some(slash) => match without_fragment[slash..].rfind('@') {
            Some(at) => {
                let at = slash + at;
                (
                    &without_fragment[..at],
                    Some(without_fragment[at + 1..].to_string()),
                )
            }
            None => (without_fragment, None),
        },
        None => (without_fragment, None),
    };

    if reference.as_deref().is_some_and(str::is_empty) {
        return EntryKind::Invalid {
            reason: "empty revision after '@'".to_string(),
        };
    }

    match Url::parse(url_part) {
        Ok(url) if matches!(url.scheme(), "https" | "http" | "ssh" | "git" | "file") => {
            EntryKind::Source(SourceRef {
                vcs: "git".to_string(),
                url: url_part.to_string(),
                reference,
                egg,
            })
        }
        Ok(url) => EntryKind::Invalid {
            reason: format!("unsupported source URL scheme: '{}'", url.scheme()),
        },
        Err(e) => EntryKind::Invalid {
            reason: format!("invalid source URL '{}': {}", url_part, e),
        },
    }
}

/// `name[extras] <constraints> ; <marker>`
fn parse_requirement(line: &str) -> EntryKind {
    let (spec_part, marker) = match line.split_once(';') {
        Some((head, tail)) => {
            let marker = tail.trim();
            (
                head.trim(),
                (!marker.is_empty()).then(|| marker.to_string()),
            )
        }
        None => (line, None),
    };

    let constraint_start = spec_part.find(|c| matches!(c, '<' | '>' | '=' | '!' | '~'));
    let (name_part, constraint_part) = match constraint_start {
        Some(pos) => (spec_part[..pos].trim(), spec_part[pos..].trim()),
        None => (spec_part.trim(), ""),
    };

    let (name, extras) = match name_part.split_once('[') {
        Some((name, rest)) => match rest.strip_suffix(']') {
            Some(extras) => (
                name.trim(),
                extras
                    .split(',')
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect(),
            ),
            None => {
                return EntryKind::Invalid {
                    reason: format!("unclosed extras bracket in '{}'", name_part),
                }
            }
        },
        None => (name_part, Vec::new()),
    };

    if !NAME_RE.is_match(name) {
        return EntryKind::Invalid {
            reason: format!("invalid package name: '{}'", name),
        };
    }

    let mut constraints = Vec::new();
    let mut constraint_errors = Vec::new();
    if !constraint_part.is_empty() {
        for piece in constraint_part.split(',') {
            match VersionConstraint::parse(piece) {
                Ok(c) => constraints.push(c),
                Err(e) => constraint_errors.push(e),
            }
        }
    }

    EntryKind::Package(Requirement {
        name: name.to_string(),
        extras,
        constraints,
        constraint_errors,
        marker,
    })
}
