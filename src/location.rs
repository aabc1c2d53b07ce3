//! Reverse geocoding via the public Nominatim API.
//!
//! Used during checkout when the customer shares a location instead of
//! typing an address. Any failure degrades to `None`; an order without a
//! resolved address is still valid.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const USER_AGENT: &str = "tg-storefront-bot/0.1 (https://example.com)";

#[derive(Deserialize)]
struct ReverseResponse {
  display_name: Option<String>,
  name: Option<String>,
  address: Option<serde_json::Map<String, serde_json::Value>>,
}

pub async fn reverse_geocode(lat: f64, lon: f64) -> Option<String> {
  let client = reqwest::Client::builder()
    .timeout(Duration::from_secs(10))
    .user_agent(USER_AGENT)
    .build()
    .ok()?;

  let response = client
    .get(NOMINATIM_URL)
    .query(&[
      ("format", "jsonv2".to_string()),
      ("lat", format!("{lat:.8}")),
      ("lon", format!("{lon:.8}")),
      ("zoom", "18".to_string()),
      ("addressdetails", "1".to_string()),
    ])
    .send()
    .await
    .ok()?;

  if !response.status().is_success() {
    debug!(status = %response.status(), "nominatim returned an error status");
    return None;
  }

  let data: ReverseResponse = response.json().await.ok()?;

  if let Some(display) = data.display_name.or(data.name)
    && !display.trim().is_empty()
  {
    return Some(display);
  }

  let address = data.address?;
  let parts: Vec<String> = address
    .values()
    .filter_map(|value| value.as_str())
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
    .collect();
  if parts.is_empty() { None } else { Some(parts.join(", ")) }
}

/// Compacts a raw geocoder address for display: collapses whitespace,
/// drops duplicate comma-separated parts, keeps at most four, truncates
/// to 120 chars.
pub fn prettify_address(raw: &str) -> String {
  let normalized = raw.replace('\n', " ").split_whitespace().collect::<Vec<_>>().join(" ");
  if normalized.is_empty() {
    return String::new();
  }

  let mut deduped: Vec<&str> = Vec::new();
  let mut seen: Vec<String> = Vec::new();
  for part in normalized.split(',') {
    let part = part.trim();
    if part.is_empty() {
      continue;
    }
    let lowered = part.to_lowercase();
    if seen.contains(&lowered) {
      continue;
    }
    seen.push(lowered);
    deduped.push(part);
  }

  if deduped.is_empty() {
    return normalized;
  }

  let mut compact = deduped[.. deduped.len().min(4)].join(", ");
  if compact.chars().count() > 120 {
    let truncated: String = compact.chars().take(117).collect();
    compact = format!("{}...", truncated.trim_end_matches([',', ' ']));
  }
  compact
}

#[cfg(test)]
mod tests {
  use super::prettify_address;

  #[test]
  fn collapses_whitespace_and_dedupes_parts() {
    let raw = "12 Main  St,\nSpringfield, springfield, Oregon, 97477, USA";
    assert_eq!(prettify_address(raw), "12 Main St, Springfield, Oregon, 97477");
  }

  #[test]
  fn empty_input_stays_empty() {
    assert_eq!(prettify_address("   "), "");
  }

  #[test]
  fn long_addresses_are_truncated() {
    let raw = format!("{}, tail", "x".repeat(150));
    let pretty = prettify_address(&raw);
    assert!(pretty.chars().count() <= 120);
    assert!(pretty.ends_with("..."));
  }
}
