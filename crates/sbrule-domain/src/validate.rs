//! Field validators for the declared attributes.
//!
//! Each check mirrors the naming rules ARM enforces, so a bad value fails
//! before any request is sent.

use crate::error::DomainError;

fn invalid(field: &'static str, value: &str, reason: &'static str) -> DomainError {
    DomainError::InvalidName { field, value: value.to_string(), reason }
}

/// 1–50 chars of letters, digits, periods, hyphens and underscores.
/// Must start and end with a letter or digit.
pub fn authorization_rule_name(value: &str) -> Result<(), DomainError> {
    const REASON: &str = "the name can contain only letters, numbers, periods, hyphens and \
                          underscores, must start and end with a letter or number and be up \
                          to 50 characters long";
    let len = value.chars().count();
    if len == 0 || len > 50 {
        return Err(invalid("name", value, REASON));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    {
        return Err(invalid("name", value, REASON));
    }
    if !starts_and_ends_with(value, |c| c.is_ascii_alphanumeric()) {
        return Err(invalid("name", value, REASON));
    }
    Ok(())
}

/// 6–50 chars of letters, digits and hyphens. Starts with a letter, ends
/// with a letter or digit, and may not end in `-sb` or `-mgmt`.
pub fn namespace_name(value: &str) -> Result<(), DomainError> {
    const REASON: &str = "the namespace name can contain only letters, numbers and hyphens, \
                          must start with a letter, end with a letter or number and be between \
                          6 and 50 characters long";
    let len = value.chars().count();
    if !(6..=50).contains(&len) {
        return Err(invalid("namespace_name", value, REASON));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid("namespace_name", value, REASON));
    }
    let first_is_letter = value.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let last_is_alnum = value.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_is_letter || !last_is_alnum {
        return Err(invalid("namespace_name", value, REASON));
    }
    for suffix in ["-sb", "-mgmt"] {
        if value.ends_with(suffix) {
            return Err(invalid(
                "namespace_name",
                value,
                "the namespace name cannot end with \"-sb\" or \"-mgmt\"",
            ));
        }
    }
    Ok(())
}

/// 1–260 chars. Starts with a letter or digit, ends with a letter, digit or
/// underscore; word characters, `-`, `.` and `~` in between.
///
/// `/` is rejected: the queue name is a single segment of the rule id.
pub fn queue_name(value: &str) -> Result<(), DomainError> {
    const REASON: &str = "the queue name can contain only letters, numbers, periods, hyphens, \
                          underscores and tildes, must start with a letter or number \
                          and be up to 260 characters long";
    let len = value.chars().count();
    if len == 0 || len > 260 {
        return Err(invalid("queue_name", value, REASON));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~'))
    {
        return Err(invalid("queue_name", value, REASON));
    }
    let first_ok = value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let last_ok = value
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if !first_ok || (len > 1 && !last_ok) {
        return Err(invalid("queue_name", value, REASON));
    }
    Ok(())
}

/// 1–90 chars of letters, digits, underscores, parentheses, hyphens and
/// periods. May not end in a period.
pub fn resource_group_name(value: &str) -> Result<(), DomainError> {
    let len = value.chars().count();
    if len == 0 || len > 90 {
        return Err(invalid(
            "resource_group_name",
            value,
            "the resource group name must be between 1 and 90 characters long",
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '(' | ')' | '-' | '.'))
    {
        return Err(invalid(
            "resource_group_name",
            value,
            "the resource group name may only contain alphanumeric characters, dashes, \
             underscores, parentheses and periods",
        ));
    }
    if value.ends_with('.') {
        return Err(invalid(
            "resource_group_name",
            value,
            "the resource group name cannot end with a period",
        ));
    }
    Ok(())
}

fn starts_and_ends_with(value: &str, pred: impl Fn(char) -> bool) -> bool {
    let first = value.chars().next().is_some_and(&pred);
    let last = value.chars().last().is_some_and(&pred);
    first && last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_name_accepts_common_forms() {
        assert!(authorization_rule_name("rule1").is_ok());
        assert!(authorization_rule_name("send-only_rule.v2").is_ok());
        assert!(authorization_rule_name("a").is_ok());
    }

    #[test]
    fn rule_name_rejects_bad_edges_and_length() {
        assert!(authorization_rule_name("").is_err());
        assert!(authorization_rule_name("-rule").is_err());
        assert!(authorization_rule_name("rule_").is_err());
        assert!(authorization_rule_name("rule one").is_err());
        assert!(authorization_rule_name(&"a".repeat(51)).is_err());
        assert!(authorization_rule_name(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn namespace_name_rules() {
        assert!(namespace_name("acme-orders").is_ok());
        assert!(namespace_name("short").is_err());
        assert!(namespace_name("1acme-orders").is_err());
        assert!(namespace_name("acme-orders-").is_err());
        assert!(namespace_name("acme_orders").is_err());
        assert!(namespace_name(&format!("a{}", "b".repeat(50))).is_err());
    }

    #[test]
    fn namespace_name_reserved_suffixes() {
        let err = namespace_name("orders-sb").unwrap_err();
        assert!(err.to_string().contains("-sb"), "got: {}", err);
        assert!(namespace_name("orders-mgmt").is_err());
    }

    #[test]
    fn queue_name_rules() {
        assert!(queue_name("q").is_ok());
        assert!(queue_name("orders.priority~high_").is_ok());
        assert!(queue_name("orders/priority").is_err());
        assert!(queue_name("").is_err());
        assert!(queue_name("_orders").is_err());
        assert!(queue_name("orders-").is_err());
        assert!(queue_name(&"q".repeat(261)).is_err());
    }

    #[test]
    fn resource_group_name_rules() {
        assert!(resource_group_name("rg1").is_ok());
        assert!(resource_group_name("my_rg-(prod).eu").is_ok());
        assert!(resource_group_name("rg.").is_err());
        assert!(resource_group_name("rg/1").is_err());
        assert!(resource_group_name("").is_err());
        assert!(resource_group_name(&"r".repeat(91)).is_err());
    }
}
