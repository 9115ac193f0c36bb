//! # Factors / 因子
//!
//! A factor is one token of a combinatorial axis: `py36-lint` carries the
//! factors `py36` and `lint`. This module expands generative environment
//! lists (`py{27,36}-{lint,tests}`) into concrete names and evaluates the
//! factor conditions that prefix configuration entries (`lint: flake8`).
//!
//! 因子是组合轴上的一个标记：`py36-lint` 包含因子 `py36` 和 `lint`。
//! 此模块将生成式环境列表展开为具体名称，并计算配置条目前缀中的因子条件。

use std::collections::BTreeSet;

/// Splits an environment name into its factor set.
/// 将环境名称拆分为因子集合。
pub fn factors_of(name: &str) -> BTreeSet<String> {
    name.split('-')
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expands a generative environment list into concrete names.
///
/// Items are separated by commas or newlines outside braces; each item is
/// brace-expanded into the cross product of its alternatives. Duplicates are
/// dropped, keeping the first occurrence.
///
/// 将生成式环境列表展开为具体名称。
pub fn expand_envlist(raw: &str) -> Vec<String> {
    let mut names = Vec::new();
    for item in split_top_level(raw) {
        for name in brace_expand(&item) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Splits on `,` and newlines that are not nested inside braces.
fn split_top_level(raw: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in raw.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' | '\n' if depth == 0 => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|s| s.split_whitespace().collect::<String>())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Expands the first `{a,b}` group and recurses on the results.
/// An unmatched brace leaves the text untouched.
fn brace_expand(item: &str) -> Vec<String> {
    let Some(open) = item.find('{') else {
        return vec![item.to_string()];
    };
    let Some(close_rel) = item[open..].find('}') else {
        return vec![item.to_string()];
    };
    let close = open + close_rel;

    let prefix = &item[..open];
    let suffix = &item[close + 1..];
    item[open + 1..close]
        .split(',')
        .map(str::trim)
        .flat_map(|alt| brace_expand(&format!("{prefix}{alt}{suffix}")))
        .collect()
}

/// One factor test inside a condition; `!lint` is a negated term.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    factor: String,
    negated: bool,
}

/// A factor condition such as `lint`, `py27,py36`, `py36-lint` or `!lint`.
///
/// Alternatives (comma separated) are OR-ed; the `-` separated terms of
/// one alternative are AND-ed.
///
/// 因子条件。逗号分隔的备选项取“或”，`-` 分隔的项取“与”。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    alternatives: Vec<Vec<Term>>,
}

impl Condition {
    pub fn parse(prefix: &str) -> Option<Self> {
        let alternatives: Vec<Vec<Term>> = expand_envlist(prefix)
            .iter()
            .map(|alt| {
                alt.split('-')
                    .filter(|t| !t.is_empty())
                    .map(|t| match t.strip_prefix('!') {
                        Some(factor) => Term {
                            factor: factor.to_string(),
                            negated: true,
                        },
                        None => Term {
                            factor: t.to_string(),
                            negated: false,
                        },
                    })
                    .collect()
            })
            .filter(|terms: &Vec<Term>| !terms.is_empty())
            .collect();

        if alternatives.is_empty() {
            None
        } else {
            Some(Self { alternatives })
        }
    }

    /// True when at least one alternative is fully satisfied.
    pub fn matches(&self, factors: &BTreeSet<String>) -> bool {
        self.alternatives.iter().any(|terms| {
            terms
                .iter()
                .all(|term| factors.contains(&term.factor) != term.negated)
        })
    }

    /// Every factor named by the condition, negated or not.
    pub fn factors(&self) -> impl Iterator<Item = &str> {
        self.alternatives
            .iter()
            .flatten()
            .map(|term| term.factor.as_str())
    }
}

/// Splits a `<condition>: <literal>` entry.
///
/// The prefix may only contain factor characters (alphanumerics and
/// `_ . ! , - { }`) and the colon must be followed by whitespace, so
/// entries like `git+https://host/pkg` or `{[testenv:lint]commands}` are
/// never mistaken for conditions.
///
/// 拆分 `<条件>: <字面量>` 形式的条目。
pub fn split_condition(entry: &str) -> Option<(Condition, &str)> {
    let (prefix, rest) = entry.split_once(':')?;
    if prefix.is_empty() || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let is_factor_char =
        |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '!' | ',' | '-' | '{' | '}');
    if !prefix.trim().chars().all(is_factor_char) {
        return None;
    }
    let condition = Condition::parse(prefix.trim())?;
    Some((condition, rest.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn expands_cross_product_in_order() {
        assert_eq!(
            expand_envlist("copying,{py27,py36}-{lint,tests},checksetup"),
            vec![
                "copying",
                "py27-lint",
                "py27-tests",
                "py36-lint",
                "py36-tests",
                "checksetup"
            ]
        );
    }

    #[test]
    fn expands_newline_separated_lists_and_dedupes() {
        assert_eq!(
            expand_envlist("lint\n  py{27, 36}-tests\n lint, coverage"),
            vec!["lint", "py27-tests", "py36-tests", "coverage"]
        );
    }

    #[test]
    fn unmatched_brace_is_kept_literally() {
        assert_eq!(expand_envlist("py{27"), vec!["py{27"]);
    }

    #[test]
    fn factors_split_on_dash() {
        assert_eq!(factors_of("py36-lint"), set(&["py36", "lint"]));
        assert_eq!(factors_of("coverage"), set(&["coverage"]));
    }

    #[test]
    fn simple_condition_matches_membership() {
        let (cond, rest) = split_condition("lint: flake8 src").unwrap();
        assert_eq!(rest, "flake8 src");
        assert!(cond.matches(&set(&["py36", "lint"])));
        assert!(!cond.matches(&set(&["py36", "tests"])));
    }

    #[test]
    fn comma_is_or_and_dash_is_and() {
        let (any, _) = split_condition("py27,py36: mock").unwrap();
        assert!(any.matches(&set(&["py27"])));
        assert!(any.matches(&set(&["py36", "lint"])));
        assert!(!any.matches(&set(&["py35"])));

        let (all, _) = split_condition("py36-lint: black").unwrap();
        assert!(all.matches(&set(&["py36", "lint"])));
        assert!(!all.matches(&set(&["py36", "tests"])));
    }

    #[test]
    fn negation_and_braces() {
        let (neg, _) = split_condition("!lint: pytest").unwrap();
        assert!(neg.matches(&set(&["tests"])));
        assert!(!neg.matches(&set(&["lint"])));

        let (braced, _) = split_condition("{py27,py36}-lint: pylint<2").unwrap();
        assert!(braced.matches(&set(&["py27", "lint"])));
        assert!(!braced.matches(&set(&["py35", "lint"])));
    }

    #[test]
    fn non_conditions_are_left_alone() {
        for entry in [
            "git+https://github.com/x/y.git",
            "{[testenv:lint]commands}",
            "python -c \"import sys; print(sys.version)\"",
            "-rtests_utils/test-requirements.txt",
            "bash -exc 'echo a:b'",
            "lint:flake8",
        ] {
            assert!(split_condition(entry).is_none(), "{entry}");
        }
    }

    #[test]
    fn conditional_reference_is_split() {
        let (cond, rest) = split_condition("tests:   {[testenv:tests]commands}").unwrap();
        assert!(cond.matches(&set(&["py36", "tests"])));
        assert_eq!(rest, "{[testenv:tests]commands}");
    }
}
