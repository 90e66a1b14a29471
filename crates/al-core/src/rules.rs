use std::collections::HashSet;

use regex::Regex;

/// Regex-based publisher exclusion list.
///
/// Patterns that fail to compile are skipped and handed back to the caller;
/// matching continues with the rules that did compile. This crate does no
/// logging, so the rejected patterns are the caller's to report.
#[derive(Debug, Default)]
pub struct ExclusionRules {
    rules: Vec<Regex>,
}

impl ExclusionRules {
    /// Compile a rule set, returning it together with the rejected patterns.
    pub fn compile(patterns: &[String]) -> (Self, Vec<String>) {
        let mut rules = Vec::new();
        let mut rejected = Vec::new();
        for pattern in patterns {
            match Regex::new(pattern) {
                Ok(regex) => rules.push(regex),
                Err(_) => rejected.push(pattern.clone()),
            }
        }
        (Self { rules }, rejected)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Source patterns of the rules that compiled.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.as_str())
    }

    /// True when any rule matches the publisher key.
    pub fn matches(&self, publisher_key: &str) -> bool {
        self.rules.iter().any(|r| r.is_match(publisher_key))
    }

    /// Collect the subset of `keys` excluded by this rule set.
    pub fn excluded_set<'a>(&self, keys: impl Iterator<Item = &'a str>) -> HashSet<String> {
        if self.rules.is_empty() {
            return HashSet::new();
        }
        keys.filter(|k| self.matches(k)).map(str::to_string).collect()
    }
}
