use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static PRICE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:\.\d{1,2})?$").expect("valid regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
  #[error("amount must match 0.00 format")]
  InvalidFormat,
  #[error("amount exceeds supported range")]
  OutOfRange,
}

pub fn parse_money_to_cents(input: &str) -> Result<i64, MoneyError> {
  if !PRICE_PATTERN.is_match(input.trim()) {
    return Err(MoneyError::InvalidFormat);
  }

  let mut parts = input.trim().split('.');
  let major = parts
    .next()
    .and_then(|p| p.parse::<i64>().ok())
    .ok_or(MoneyError::InvalidFormat)?;

  let minor = match parts.next() {
    None => 0,
    Some(minor) => {
      if minor.len() == 1 {
        (minor.to_owned() + "0")
          .parse::<i64>()
          .map_err(|_| MoneyError::OutOfRange)?
      } else {
        minor[.. 2].parse::<i64>().map_err(|_| MoneyError::OutOfRange)?
      }
    },
  };

  major
    .checked_mul(100)
    .and_then(|value| value.checked_add(minor))
    .ok_or(MoneyError::OutOfRange)
}

/// Renders cents as a decimal amount without trailing zeros: 1000 -> "10",
/// 1050 -> "10.5", 1055 -> "10.55".
pub fn format_cents(amount: i64) -> String {
  let major = amount / 100;
  let minor = (amount % 100).abs();
  if minor == 0 {
    format!("{major}")
  } else if minor % 10 == 0 {
    format!("{major}.{}", minor / 10)
  } else {
    format!("{major}.{minor:02}")
  }
}

pub fn is_valid_full_name(full_name: &str) -> bool {
  full_name.replace('\u{a0}', " ").split_whitespace().count() >= 2
}

pub fn is_valid_postal_code(postal_code: &str) -> bool {
  let digits: String = postal_code.trim().chars().filter(|c| !c.is_whitespace()).collect();
  !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && (5 ..= 6).contains(&digits.len())
}

/// Brings a typed or shared phone number to a `+<digits>` canonical form.
///
/// Local Russian forms are expanded: `8XXXXXXXXXX` and bare ten-digit
/// numbers become `+7...`. Anything outside 10-15 digits is rejected.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
  let raw = raw.trim();
  if raw.is_empty() {
    return None;
  }

  let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
  if digits.is_empty() {
    return None;
  }

  let normalized = if raw.starts_with('+') {
    format!("+{digits}")
  } else if digits.len() == 11 && digits.starts_with('8') {
    format!("+7{}", &digits[1 ..])
  } else if digits.len() == 10 {
    format!("+7{digits}")
  } else {
    format!("+{digits}")
  };

  let digit_count = normalized.chars().filter(|c| c.is_ascii_digit()).count();
  if !(10 ..= 15).contains(&digit_count) {
    return None;
  }

  Some(normalized)
}

/// Groups `+7` numbers for display; other numbers pass through untouched.
pub fn pretty_phone_number(phone: &str) -> String {
  let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
  if phone.starts_with("+7") && digits.len() == 11 {
    format!(
      "+7 {} {} {} {}",
      &digits[1 .. 4],
      &digits[4 .. 7],
      &digits[7 .. 9],
      &digits[9 .. 11]
    )
  } else {
    phone.to_string()
  }
}

/// One-item-per-page pager over an already fetched list.
#[derive(Debug)]
pub struct Paginator<'a, T> {
  items: &'a [T],
  page: usize,
  per_page: usize,
}

impl<'a, T> Paginator<'a, T> {
  /// Clamps `page` into `1..=pages` so stale callback data cannot point
  /// past the end after an item was removed.
  pub fn new(items: &'a [T], page: usize) -> Self {
    let mut paginator = Self {
      items,
      page: page.max(1),
      per_page: 1,
    };
    let pages = paginator.pages();
    if pages > 0 && paginator.page > pages {
      paginator.page = pages;
    }
    paginator
  }

  pub fn page(&self) -> usize {
    self.page
  }

  pub fn pages(&self) -> usize {
    self.items.len().div_ceil(self.per_page)
  }

  pub fn items(&self) -> &'a [T] {
    let start = (self.page - 1) * self.per_page;
    let stop = (start + self.per_page).min(self.items.len());
    if start >= self.items.len() {
      &[]
    } else {
      &self.items[start .. stop]
    }
  }

  pub fn has_previous(&self) -> bool {
    self.page > 1
  }

  pub fn has_next(&self) -> bool {
    self.page < self.pages()
  }
}

#[cfg(test)]
mod tests {
  use super::MoneyError;
  use super::Paginator;
  use super::format_cents;
  use super::is_valid_full_name;
  use super::is_valid_postal_code;
  use super::normalize_phone_number;
  use super::parse_money_to_cents;
  use super::pretty_phone_number;

  #[test]
  fn parses_valid_amounts() {
    assert_eq!(parse_money_to_cents("10"), Ok(1000));
    assert_eq!(parse_money_to_cents("10.5"), Ok(1050));
    assert_eq!(parse_money_to_cents("10.55"), Ok(1055));
  }

  #[test]
  fn rejects_invalid_formats() {
    assert_eq!(parse_money_to_cents("abc"), Err(MoneyError::InvalidFormat));
    assert_eq!(parse_money_to_cents("10.555"), Err(MoneyError::InvalidFormat));
    assert_eq!(parse_money_to_cents("-3"), Err(MoneyError::InvalidFormat));
  }

  #[test]
  fn formats_without_trailing_zeros() {
    assert_eq!(format_cents(1000), "10");
    assert_eq!(format_cents(1050), "10.5");
    assert_eq!(format_cents(1234), "12.34");
    assert_eq!(format_cents(7), "0.07");
  }

  #[test]
  fn full_name_needs_two_parts() {
    assert!(is_valid_full_name("Jane Doe"));
    assert!(is_valid_full_name("  Jane\u{a0}Doe "));
    assert!(!is_valid_full_name("Jane"));
    assert!(!is_valid_full_name("   "));
  }

  #[test]
  fn postal_code_is_five_or_six_digits() {
    assert!(is_valid_postal_code("12345"));
    assert!(is_valid_postal_code(" 123 456 "));
    assert!(!is_valid_postal_code("1234"));
    assert!(!is_valid_postal_code("1234567"));
    assert!(!is_valid_postal_code("12a45"));
  }

  #[test]
  fn normalizes_phone_variants() {
    assert_eq!(normalize_phone_number("+1 202 555 0123").as_deref(), Some("+12025550123"));
    assert_eq!(normalize_phone_number("89161234567").as_deref(), Some("+79161234567"));
    assert_eq!(normalize_phone_number("9161234567").as_deref(), Some("+79161234567"));
    assert_eq!(normalize_phone_number("not a phone"), None);
    assert_eq!(normalize_phone_number("123"), None);
  }

  #[test]
  fn pretty_prints_russian_numbers() {
    assert_eq!(pretty_phone_number("+79161234567"), "+7 916 123 45 67");
    assert_eq!(pretty_phone_number("+12025550123"), "+12025550123");
  }

  #[test]
  fn paginator_clamps_and_slices() {
    let items = vec!["a", "b", "c"];
    let paginator = Paginator::new(&items, 2);
    assert_eq!(paginator.page(), 2);
    assert_eq!(paginator.pages(), 3);
    assert_eq!(paginator.items(), &["b"]);
    assert!(paginator.has_previous());
    assert!(paginator.has_next());

    let clamped = Paginator::new(&items, 99);
    assert_eq!(clamped.page(), 3);
    assert!(!clamped.has_next());

    let empty: Vec<&str> = Vec::new();
    let paginator = Paginator::new(&empty, 1);
    assert_eq!(paginator.pages(), 0);
    assert!(paginator.items().is_empty());
  }
}
