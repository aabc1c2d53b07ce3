//! Telegraph page publishing for long product descriptions.
//!
//! Telegram captions top out around 1024 chars, so descriptions over the
//! budget get published as a Telegraph page and the product stores the
//! page URL instead of inlining the text.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

const CREATE_PAGE_URL: &str = "https://api.telegra.ph/createPage";

/// Descriptions longer than this get published to Telegraph.
pub const DETAILS_THRESHOLD: usize = 900;

#[derive(Debug, Error)]
pub enum TelegraphError {
  #[error("TELEGRAPH_TOKEN is not configured")]
  MissingToken,
  #[error("telegraph request failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("telegraph api error: {0}")]
  Api(String),
  #[error("telegraph returned no page url")]
  MissingUrl,
}

#[derive(Deserialize)]
struct CreatePageResponse {
  ok: bool,
  error: Option<String>,
  result: Option<CreatePageResult>,
}

#[derive(Deserialize)]
struct CreatePageResult {
  url: Option<String>,
}

/// Converts plain text into Telegraph content nodes: paragraphs split on
/// blank lines, line breaks inside a paragraph become `br` nodes.
pub fn text_to_nodes(text: &str) -> Value {
  let mut nodes = Vec::new();

  for block in text.split("\n\n") {
    let block = block.trim();
    if block.is_empty() {
      continue;
    }

    let mut children = Vec::new();
    for (index, line) in block.lines().enumerate() {
      if index > 0 {
        children.push(json!({"tag": "br"}));
      }
      let line = line.trim_end_matches('\r');
      if !line.is_empty() {
        children.push(Value::String(line.to_string()));
      }
    }
    nodes.push(json!({"tag": "p", "children": children}));
  }

  if nodes.is_empty() {
    nodes.push(Value::String(String::new()));
  }
  Value::Array(nodes)
}

/// Creates a Telegraph page and returns its public URL.
pub async fn create_page(token: Option<&str>, title: &str, text: &str) -> Result<String, TelegraphError> {
  let token = token.ok_or(TelegraphError::MissingToken)?;

  let title = if title.trim().is_empty() { "Product details" } else { title };
  let payload = json!({
    "access_token": token,
    "title": title,
    "content": text_to_nodes(text),
    "return_content": false,
  });

  let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
  let response = client.post(CREATE_PAGE_URL).json(&payload).send().await?;
  let data: CreatePageResponse = response.json().await?;

  if !data.ok {
    return Err(TelegraphError::Api(
      data.error.unwrap_or_else(|| "unknown telegraph error".to_string()),
    ));
  }

  data
    .result
    .and_then(|result| result.url)
    .ok_or(TelegraphError::MissingUrl)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::text_to_nodes;

  #[test]
  fn splits_paragraphs_on_blank_lines() {
    let nodes = text_to_nodes("first\n\nsecond");
    assert_eq!(
      nodes,
      json!([
        {"tag": "p", "children": ["first"]},
        {"tag": "p", "children": ["second"]},
      ])
    );
  }

  #[test]
  fn keeps_line_breaks_inside_a_paragraph() {
    let nodes = text_to_nodes("line one\nline two");
    assert_eq!(
      nodes,
      json!([
        {"tag": "p", "children": ["line one", {"tag": "br"}, "line two"]},
      ])
    );
  }

  #[test]
  fn empty_text_yields_a_single_empty_node() {
    assert_eq!(text_to_nodes("  \n\n "), json!([""]));
  }
}
