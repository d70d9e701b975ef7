use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(\d+(?:\.\d+)*)(?:(a|b|rc)(\d+))?(?:\.post(\d+))?(?:\.dev(\d+))?$")
        .expect("version regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub release: Vec<u64>,
    pub pre: Option<(PreKind, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
}

// 尾端補零視為相同版本（1.0 == 1.0.0），等價性必須跟排序一致
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Version {
    /// 解析 `N(.N)*` 加上可選的 aN/bN/rcN、.postN、.devN 字尾
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        let caps = VERSION_RE
            .captures(trimmed)
            .ok_or_else(|| format!("not a valid version: '{}'", trimmed))?;

        let release = caps[1]
            .split('.')
            .map(|seg| {
                seg.parse::<u64>()
                    .map_err(|_| format!("version segment out of range: '{}'", seg))
            })
            .collect::<Result<Vec<u64>, String>>()?;

        let pre = match caps.get(2) {
            Some(kind) => {
                let n = caps[3]
                    .parse::<u64>()
                    .map_err(|_| format!("pre-release number out of range in '{}'", trimmed))?;
                let kind = match kind.as_str().to_ascii_lowercase().as_str() {
                    "a" => PreKind::Alpha,
                    "b" => PreKind::Beta,
                    _ => PreKind::Rc,
                };
                Some((kind, n))
            }
            None => None,
        };

        let post = caps
            .get(4)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .map_err(|_| format!("post-release number out of range in '{}'", trimmed))?;
        let dev = caps
            .get(5)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .map_err(|_| format!("dev-release number out of range in '{}'", trimmed))?;

        Ok(Self {
            release,
            pre,
            post,
            dev,
        })
    }

    fn release_segment(&self, idx: usize) -> u64 {
        self.release.get(idx).copied().unwrap_or(0)
    }

    fn cmp_release(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            match self.release_segment(i).cmp(&other.release_segment(i)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    // dev < alpha < beta < rc < final < post
    fn phase_rank(&self) -> u8 {
        if self.post.is_some() {
            return 5;
        }
        match self.pre {
            Some((PreKind::Alpha, _)) => 1,
            Some((PreKind::Beta, _)) => 2,
            Some((PreKind::Rc, _)) => 3,
            None => {
                if self.dev.is_some() {
                    0
                } else {
                    4
                }
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_release(other)
            .then_with(|| self.phase_rank().cmp(&other.phase_rank()))
            .then_with(|| {
                let pre_n = |v: &Version| v.pre.map(|(_, n)| n).unwrap_or(0);
                pre_n(self).cmp(&pre_n(other))
            })
            .then_with(|| self.post.unwrap_or(0).cmp(&other.post.unwrap_or(0)))
            .then_with(|| {
                // 同一階段內，.devN 排在沒有 dev 字尾的版本之前
                let dev_key = |v: &Version| match v.dev {
                    Some(n) => (0u8, n),
                    None => (1u8, 0),
                };
                dev_key(self).cmp(&dev_key(other))
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let release = self
            .release
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{}", release)?;
        if let Some((kind, n)) = self.pre {
            let tag = match kind {
                PreKind::Alpha => "a",
                PreKind::Beta => "b",
                PreKind::Rc => "rc",
            };
            write!(f, "{}{}", tag, n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Compatible,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Compatible => "~=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub op: Comparator,
    pub version: Version,
}

impl VersionConstraint {
    /// 解析單一條件，例如 `>= 4.0.1`
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();

        // 先比對兩字元運算子，避免 `>=` 被當成 `>`
        let (op, rest) = if let Some(rest) = trimmed.strip_prefix("==") {
            (Comparator::Eq, rest)
        } else if let Some(rest) = trimmed.strip_prefix("!=") {
            (Comparator::Ne, rest)
        } else if let Some(rest) = trimmed.strip_prefix(">=") {
            (Comparator::Ge, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (Comparator::Le, rest)
        } else if let Some(rest) = trimmed.strip_prefix("~=") {
            (Comparator::Compatible, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (Comparator::Gt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (Comparator::Lt, rest)
        } else {
            return Err(format!("missing comparator in '{}'", trimmed));
        };

        let version = Version::parse(rest)?;

        if op == Comparator::Compatible && version.release.len() < 2 {
            return Err(format!(
                "'~= {}' needs at least two release segments",
                version
            ));
        }

        Ok(Self { op, version })
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Comparator::Eq => candidate.cmp(&self.version) == Ordering::Equal,
            Comparator::Ne => candidate.cmp(&self.version) != Ordering::Equal,
            Comparator::Ge => *candidate >= self.version,
            Comparator::Le => *candidate <= self.version,
            Comparator::Gt => *candidate > self.version,
            Comparator::Lt => *candidate < self.version,
            Comparator::Compatible => {
                if *candidate < self.version {
                    return false;
                }
                // ~= X.Y.Z 等同 >= X.Y.Z 且與 X.Y 同一系列
                let prefix = &self.version.release[..self.version.release.len() - 1];
                prefix
                    .iter()
                    .enumerate()
                    .all(|(i, seg)| candidate.release_segment(i) == *seg)
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.as_str(), self.version)
    }
}

/// 解析逗號分隔的條件串，例如 `>= 1.0, < 2.0`
pub fn parse_constraints(input: &str) -> Result<Vec<VersionConstraint>, String> {
    input
        .split(',')
        .map(VersionConstraint::parse)
        .collect::<Result<Vec<_>, String>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_release_versions() {
        assert_eq!(vec![4, 0, 1], v("4.0.1").release);
        assert_eq!(vec![2], v("2").release);
        assert!(Version::parse("abc").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn test_parse_suffixes() {
        let version = v("1.0rc2");
        assert_eq!(Some((PreKind::Rc, 2)), version.pre);

        let version = v("2.1.post3");
        assert_eq!(Some(3), version.post);

        let version = v("3.0.dev5");
        assert_eq!(Some(5), version.dev);
    }

    #[test]
    fn test_numeric_segment_ordering() {
        assert!(v("1.9") < v("1.10"));
        assert!(v("1.0.1") > v("1.0"));
        assert_eq!(Ordering::Equal, v("1.0").cmp(&v("1.0.0")));
    }

    #[test]
    fn test_phase_ordering() {
        assert!(v("1.0.dev1") < v("1.0a1"));
        assert!(v("1.0a1") < v("1.0b1"));
        assert!(v("1.0b1") < v("1.0rc1"));
        assert!(v("1.0rc1") < v("1.0"));
        assert!(v("1.0") < v("1.0.post1"));
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["4.0.1", "1.0rc2", "2.1.post3", "3.0.dev5"] {
            assert_eq!(s, v(s).to_string());
        }
    }

    #[test]
    fn test_constraint_parse() {
        let c = VersionConstraint::parse(">= 4.0.1").unwrap();
        assert_eq!(Comparator::Ge, c.op);
        assert_eq!(vec![4, 0, 1], c.version.release);

        assert!(VersionConstraint::parse("4.0.1").is_err());
        assert!(VersionConstraint::parse(">= not.a.version").is_err());
        assert!(VersionConstraint::parse("~= 2").is_err());
    }

    #[test]
    fn test_constraint_matching() {
        let c = VersionConstraint::parse(">=1.2").unwrap();
        assert!(c.matches(&v("1.2")));
        assert!(c.matches(&v("2.0")));
        assert!(!c.matches(&v("1.1.9")));

        let c = VersionConstraint::parse("!=1.5").unwrap();
        assert!(c.matches(&v("1.4")));
        assert!(!c.matches(&v("1.5")));

        let c = VersionConstraint::parse("==1.0").unwrap();
        assert!(c.matches(&v("1.0.0")));
    }

    #[test]
    fn test_compatible_release() {
        let c = VersionConstraint::parse("~= 2.2").unwrap();
        assert!(c.matches(&v("2.2")));
        assert!(c.matches(&v("2.9")));
        assert!(!c.matches(&v("3.0")));
        assert!(!c.matches(&v("2.1")));

        let c = VersionConstraint::parse("~= 1.4.5").unwrap();
        assert!(c.matches(&v("1.4.9")));
        assert!(!c.matches(&v("1.5.0")));
    }

    #[test]
    fn test_parse_constraint_list() {
        let list = parse_constraints(">= 1.0, < 2.0").unwrap();
        assert_eq!(2, list.len());
        assert_eq!(Comparator::Ge, list[0].op);
        assert_eq!(Comparator::Lt, list[1].op);

        assert!(parse_constraints(">= 1.0, banana").is_err());
    }
}
