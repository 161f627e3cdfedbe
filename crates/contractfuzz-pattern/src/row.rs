//! Example rows bound to field names

use indexmap::IndexMap;

use crate::pattern::without_optionality;

/// Example literals keyed by field name, plus fields an example leaves out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: IndexMap<String, String>,
    omitted: Vec<String>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn omitting(mut self, name: impl Into<String>) -> Self {
        self.omitted.push(name.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.omitted.is_empty()
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_omitted(&self, name: &str) -> bool {
        self.omitted.iter().any(|o| o == name)
    }

    /// Drop entries whose (optionality-stripped) key this row omits.
    pub fn without_omitted_keys<'p, P>(&self, entries: &[(&'p str, P)]) -> Vec<(&'p str, P)>
    where
        P: Copy,
    {
        entries
            .iter()
            .filter(|(key, _)| !self.is_omitted(without_optionality(key)))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_and_omissions() {
        let row = Row::new().with_field("id", "10").omitting("name");
        assert!(row.contains_field("id"));
        assert_eq!(row.get_field("id"), Some("10"));
        assert!(row.is_omitted("name"));
        assert!(!row.is_empty());
    }

    #[test]
    fn omitted_keys_match_without_optionality() {
        let row = Row::new().omitting("name");
        let entries = [("id", 1), ("name?", 2)];
        assert_eq!(row.without_omitted_keys(&entries), vec![("id", 1)]);
    }
}
