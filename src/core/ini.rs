//! # INI Dialect Parser / INI 方言解析器
//!
//! Parses the `tox.ini` flavour of INI used by the declarative configuration:
//!
//! ```ini
//! [testenv:lint]
//! commands = python setup.py lint
//!            flake8
//! ```
//!
//! - Section headers are `[name]`; names keep their case.
//! - Keys are `key = value`, lower-cased; continuation lines are indented.
//! - Lines starting with `#` or `;` are comments, also inside a value.
//!
//! 解析声明式配置使用的 `tox.ini` 风格 INI。

use std::path::Path;

use crate::core::config::RawSection;
use crate::core::error::ConfigParseError;

/// Parses INI text into sections in declaration order.
/// 将 INI 文本按声明顺序解析为多个 section。
pub fn parse(path: &Path, text: &str) -> Result<Vec<RawSection>, ConfigParseError> {
    let mut sections: Vec<RawSection> = Vec::new();
    // The key currently accepting continuation lines.
    let mut open_key: Option<String> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let indented = raw_line.starts_with(' ') || raw_line.starts_with('\t');

        if indented {
            let (Some(section), Some(key)) = (sections.last_mut(), open_key.as_ref()) else {
                return Err(ConfigParseError::new(
                    path,
                    line_no,
                    "continuation line without a preceding key",
                ));
            };
            if let Some(value) = section.values.get_mut(key) {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(trimmed);
            }
            continue;
        }

        if trimmed.starts_with('[') {
            let Some(name) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            else {
                return Err(ConfigParseError::new(
                    path,
                    line_no,
                    format!("malformed section header '{trimmed}'"),
                ));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigParseError::new(path, line_no, "empty section name"));
            }
            if sections.iter().any(|s| s.name == name) {
                return Err(ConfigParseError::new(
                    path,
                    line_no,
                    format!("duplicate section [{name}]"),
                ));
            }
            sections.push(RawSection::new(name, line_no));
            open_key = None;
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(ConfigParseError::new(
                path,
                line_no,
                format!("expected 'key = value', found '{trimmed}'"),
            ));
        };
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return Err(ConfigParseError::new(path, line_no, "empty key"));
        }

        let Some(section) = sections.last_mut() else {
            return Err(ConfigParseError::new(
                path,
                line_no,
                format!("key '{key}' appears before any section header"),
            ));
        };
        if section.values.contains_key(&key) {
            return Err(ConfigParseError::new(
                path,
                line_no,
                format!("duplicate key '{key}' in section [{}]", section.name),
            ));
        }
        section.values.insert(key.clone(), value.trim().to_string());
        open_key = Some(key);
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(text: &str) -> Result<Vec<RawSection>, ConfigParseError> {
        parse(Path::new("tox.ini"), text)
    }

    #[test]
    fn parses_sections_and_continuations() {
        let sections = parse_str(
            "[tox]\nenvlist = py36-lint\n\n[testenv:lint]\ncommands = python setup.py lint\n    flake8\n",
        )
        .unwrap();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "tox");
        assert_eq!(sections[0].values["envlist"], "py36-lint");
        assert_eq!(
            sections[1].values["commands"],
            "python setup.py lint\nflake8"
        );
    }

    #[test]
    fn empty_first_line_value_is_filled_by_continuations() {
        let sections = parse_str("[testenv]\ndeps =\n    pytest\n    mock\n").unwrap();
        assert_eq!(sections[0].values["deps"], "pytest\nmock");
    }

    #[test]
    fn comments_inside_values_are_skipped() {
        let sections =
            parse_str("[testenv]\ncommands =\n    # lint first\n    flake8\n; trailing\n").unwrap();
        assert_eq!(sections[0].values["commands"], "flake8");
    }

    #[test]
    fn keys_are_lowercased() {
        let sections = parse_str("[testenv]\nSkip_Install = True\n").unwrap();
        assert_eq!(sections[0].values["skip_install"], "True");
    }

    #[test]
    fn rejects_malformed_header() {
        let err = parse_str("[testenv\ndeps = x\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("malformed section header"));
    }

    #[test]
    fn rejects_key_outside_section() {
        let err = parse_str("deps = x\n").unwrap_err();
        assert!(err.message.contains("before any section header"));
    }

    #[test]
    fn rejects_line_without_equals() {
        let err = parse_str("[testenv]\njust some words\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn rejects_duplicates() {
        assert!(parse_str("[a]\n[a]\n").is_err());
        assert!(parse_str("[a]\nk = 1\nk = 2\n").is_err());
    }

    #[test]
    fn rejects_orphan_continuation() {
        let err = parse_str("[a]\n    orphan\n").unwrap_err();
        assert!(err.message.contains("continuation"));
    }
}
