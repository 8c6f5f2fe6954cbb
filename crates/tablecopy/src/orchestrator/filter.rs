//! Include/exclude filtering of discovered table names.

use regex::Regex;

use crate::error::Result;

/// Compiled include and exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl TableFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        let compile = |patterns: &[S]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| p.as_ref().trim())
                .filter(|p| !p.is_empty())
                .map(|p| Regex::new(p).map_err(Into::into))
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Exclude wins over include; no include patterns means every table.
    pub fn matches(&self, table: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(table)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = TableFilter::new::<&str>(&[], &[]).unwrap();
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_exclude_wins() {
        let filter = TableFilter::new(&["^order"], &["_bak$"]).unwrap();
        assert!(filter.matches("orders"));
        assert!(filter.matches("order_items"));
        assert!(!filter.matches("orders_bak"));
        assert!(!filter.matches("customers"));
    }

    #[test]
    fn test_exclude_only() {
        let filter = TableFilter::new(&[""], &["^tmp_"]).unwrap();
        assert!(filter.matches("users"));
        assert!(!filter.matches("tmp_users"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = TableFilter::new(&["("], &[]).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
