use crate::error::{Error, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Checks that a base table name is safe to splice into a shard table name.
/// Only lowercase alphanumerics and underscores are accepted.
pub fn validate_table_name(name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::Config("Table name cannot be empty".into()));
  }

  let valid = name
    .chars()
    .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'));

  if !valid || name.starts_with(|c: char| c.is_ascii_digit()) {
    return Err(Error::Config(format!("Invalid table name: {}", name)));
  }

  Ok(())
}

/// Generates the physical table name of a shard.
/// Format: mod4_models_0003 (4 digits)
pub fn shard_table_name(base: &str, index: u32) -> String {
  format!("{}_{:04}", base, index)
}

/// Parses a shard index back out of a shard table name.
pub fn parse_shard_index(table_name: &str, base: &str) -> Option<u32> {
  let suffix = table_name.strip_prefix(base)?.strip_prefix('_')?;
  if suffix.len() < 4 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  suffix.parse::<u32>().ok()
}

/// Derives the default base table name from an entity type name.
///
/// `Mod4Model` becomes `mod4_models`, `billing::Invoice` becomes `invoices`.
pub fn default_table_name(type_name: &str) -> String {
  let short = type_name.rsplit("::").next().unwrap_or(type_name);
  pluralize(&underscore(short))
}

fn underscore(name: &str) -> String {
  let chars: Vec<char> = name.chars().collect();
  let mut out = String::with_capacity(name.len() + 4);

  for (i, &c) in chars.iter().enumerate() {
    if c.is_ascii_uppercase() && i > 0 {
      let prev = chars[i - 1];
      let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
      if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
        out.push('_');
      }
    }
    if c == '-' || c == ' ' {
      out.push('_');
    } else {
      out.push(c.to_ascii_lowercase());
    }
  }
  out
}

fn pluralize(word: &str) -> String {
  if word.ends_with("ss")
    || word.ends_with('x')
    || word.ends_with('z')
    || word.ends_with("ch")
    || word.ends_with("sh")
  {
    return format!("{}es", word);
  }
  if word.ends_with('s') {
    return word.to_string();
  }
  if let Some(stem) = word.strip_suffix('y') {
    if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) && !stem.is_empty() {
      return format!("{}ies", stem);
    }
  }
  format!("{}s", word)
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_micros() as i64)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_table_names() {
    assert_eq!(shard_table_name("mod4_models", 3), "mod4_models_0003");
    assert_eq!(shard_table_name("users", 12345), "users_12345");
    assert_eq!(parse_shard_index("mod4_models_0003", "mod4_models"), Some(3));
    assert_eq!(parse_shard_index("mod4_models_03", "mod4_models"), None);
    assert_eq!(parse_shard_index("other_0003", "mod4_models"), None);
  }

  #[test]
  fn test_default_table_name() {
    assert_eq!(default_table_name("Mod4Model"), "mod4_models");
    assert_eq!(default_table_name("billing::Invoice"), "invoices");
    assert_eq!(default_table_name("HTTPRequest"), "http_requests");
    assert_eq!(default_table_name("Category"), "categories");
    assert_eq!(default_table_name("Box"), "boxes");
    assert_eq!(default_table_name("Day"), "days");
  }

  #[test]
  fn test_validation() {
    assert!(validate_table_name("mod4_models").is_ok());
    assert!(validate_table_name("").is_err());
    assert!(validate_table_name("Users").is_err());
    assert!(validate_table_name("users; drop").is_err());
    assert!(validate_table_name("4users").is_err());
  }
}
