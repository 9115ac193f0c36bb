//! # Fragment Store / 片段存储
//!
//! Holds the raw, unresolved attribute lists declared per section. The store
//! is read-only once built and is shared by every composition and every
//! concurrently running environment.
//!
//! 保存每个 section 声明的原始、未解析的属性列表。构建后只读。

use std::collections::BTreeMap;

use crate::core::config::RawSection;
use crate::core::error::ComposeError;

#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    sections: BTreeMap<String, RawSection>,
    order: Vec<String>,
}

impl FragmentStore {
    pub fn new(sections: Vec<RawSection>) -> Self {
        let mut store = Self::default();
        for section in sections {
            store.order.push(section.name.clone());
            store.sections.insert(section.name.clone(), section);
        }
        store
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn has_attribute(&self, section: &str, attribute: &str) -> bool {
        self.sections
            .get(section)
            .is_some_and(|s| s.values.contains_key(attribute))
    }

    /// Section names in declaration order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Every `(attribute, raw value)` pair of every section.
    pub fn all_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sections
            .values()
            .flat_map(|s| s.values.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// The raw value of an attribute, exactly as declared.
    pub fn raw(&self, section: &str, attribute: &str) -> Result<&str, ComposeError> {
        let declared = self
            .sections
            .get(section)
            .ok_or_else(|| ComposeError::UndefinedSection(section.to_string()))?;
        declared
            .values
            .get(attribute)
            .map(String::as_str)
            .ok_or_else(|| ComposeError::UndefinedAttribute {
                section: section.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// The declared list of an attribute: one entry per non-empty line,
    /// with lines ending in `\` joined to the next one.
    ///
    /// 属性的声明列表：每个非空行一个条目，以 `\` 结尾的行与下一行拼接。
    pub fn get(&self, section: &str, attribute: &str) -> Result<Vec<String>, ComposeError> {
        Ok(split_entries(self.raw(section, attribute)?))
    }
}

fn split_entries(raw: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut pending: Option<String> = None;

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut current = match pending.take() {
            Some(mut head) => {
                head.push(' ');
                head.push_str(line);
                head
            }
            None => line.to_string(),
        };
        if let Some(stripped) = current.strip_suffix('\\') {
            current = stripped.trim_end().to_string();
            pending = Some(current);
        } else {
            entries.push(current);
        }
    }
    if let Some(rest) = pending {
        entries.push(rest);
    }
    entries
}
