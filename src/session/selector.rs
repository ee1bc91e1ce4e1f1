use std::fmt;

use crate::{Result, TunnelError};

/// Tag filter identifying the jump instance, parsed from a `KEY=VALUE` selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

impl TagFilter {
    /// Parse a `KEY=VALUE` selector, splitting on the first `=` and trimming
    /// whitespace on both sides
    pub fn parse(selector: &str) -> Result<Self> {
        let (key, value) = selector
            .split_once('=')
            .ok_or_else(|| TunnelError::InvalidSelector(selector.to_string()))?;

        let key = key.trim();
        let value = value.trim();

        if key.is_empty() || value.is_empty() {
            return Err(TunnelError::InvalidSelector(selector.to_string()));
        }

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let filter = TagFilter::parse("application=jump_server").unwrap();
        assert_eq!(filter.key, "application");
        assert_eq!(filter.value, "jump_server");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let filter = TagFilter::parse("  application = jump_server ").unwrap();
        assert_eq!(filter.key, "application");
        assert_eq!(filter.value, "jump_server");
    }

    #[test]
    fn test_parse_splits_on_first_equals() {
        let filter = TagFilter::parse("env=a=b").unwrap();
        assert_eq!(filter.key, "env");
        assert_eq!(filter.value, "a=b");
    }

    #[test]
    fn test_parse_no_equals() {
        assert!(matches!(
            TagFilter::parse("application"),
            Err(TunnelError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_parse_empty_sides() {
        assert!(TagFilter::parse("=jump_server").is_err());
        assert!(TagFilter::parse("application=").is_err());
        assert!(TagFilter::parse("=").is_err());
        assert!(TagFilter::parse("  =  ").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let filter = TagFilter::parse("application=jump_server").unwrap();
        assert_eq!(filter.to_string(), "application=jump_server");
    }
}
