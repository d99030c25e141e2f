//! Evidence items: the raw material of the pipeline.
//!
//! Scrapers and search collaborators hand over payloads whose shape varies by
//! source. [`normalize`] maps each payload onto the fixed [`EvidenceItem`]
//! shape; nothing downstream ever sees a source-specific format.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Fields checked, in order, for the evidence text.
const TEXT_FIELDS: &[&str] = &[
  "text",
  "content",
  "markdown",
  "answer",
  "snippet",
  "description",
  "body",
  "title",
];

const URL_FIELDS: &[&str] = &["url", "link", "source_url"];

const TIMESTAMP_FIELDS: &[&str] =
  &["timestamp", "published_at", "date", "scraped_at"];

/// Share of control or replacement characters above which text is treated as
/// undecoded binary (e.g. a failed PDF-to-text extraction).
const UNREADABLE_RATIO: f64 = 0.10;

// ─── Source type ─────────────────────────────────────────────────────────────

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
  Web,
  News,
  LinkedIn,
  Search,
  Procurement,
  Document,
  Other,
}

impl SourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Web => "web",
      Self::News => "news",
      Self::LinkedIn => "linked_in",
      Self::Search => "search",
      Self::Procurement => "procurement",
      Self::Document => "document",
      Self::Other => "other",
    }
  }

  /// Map a free-form collaborator label onto a source type. Unknown labels
  /// become [`SourceType::Other`].
  pub fn from_hint(hint: &str) -> Self {
    match hint.trim().to_ascii_lowercase().as_str() {
      "web" | "brightdata" | "scrape" | "website" => Self::Web,
      "news" | "press" | "press_release" => Self::News,
      "linkedin" | "linked_in" => Self::LinkedIn,
      "search" | "perplexity" | "serp" => Self::Search,
      "procurement" | "tender" | "tender_portal" => Self::Procurement,
      "document" | "pdf" => Self::Document,
      _ => Self::Other,
    }
  }

  fn infer_from_url(url: &str) -> Self {
    let lower = url.to_ascii_lowercase();
    if lower.contains("linkedin.com") {
      Self::LinkedIn
    } else if lower.ends_with(".pdf") {
      Self::Document
    } else {
      Self::Web
    }
  }
}

// ─── EvidenceItem ────────────────────────────────────────────────────────────

/// A single piece of collected evidence about an entity. Never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
  /// SHA-256 hex digest over source type, URL and text.
  pub evidence_id: String,
  pub text:        String,
  pub source_type: SourceType,
  pub url:         Option<String>,
  /// When the evidence was published or collected, if known.
  pub timestamp:   Option<DateTime<Utc>>,
}

impl EvidenceItem {
  pub fn new(
    text: impl Into<String>,
    source_type: SourceType,
    url: Option<String>,
    timestamp: Option<DateTime<Utc>>,
  ) -> Self {
    let text = text.into();
    let evidence_id = evidence_id(source_type, url.as_deref(), &text);
    Self { evidence_id, text, source_type, url, timestamp }
  }

  /// `true` if the text has no non-whitespace content.
  pub fn is_blank(&self) -> bool { self.text.trim().is_empty() }

  /// `true` if the text looks like undecoded binary rather than prose.
  pub fn is_unreadable(&self) -> bool {
    let total = self.text.chars().count();
    if total == 0 {
      return false;
    }
    let bad = self
      .text
      .chars()
      .filter(|c| {
        *c == char::REPLACEMENT_CHARACTER
          || (c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
      })
      .count();
    bad as f64 / total as f64 > UNREADABLE_RATIO
  }
}

/// Content hash identifying a piece of evidence.
pub fn evidence_id(source_type: SourceType, url: Option<&str>, text: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(source_type.as_str().as_bytes());
  hasher.update([0u8]);
  hasher.update(url.unwrap_or_default().as_bytes());
  hasher.update([0u8]);
  hasher.update(text.as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Normalization ───────────────────────────────────────────────────────────

/// Normalize one collaborator payload into an [`EvidenceItem`].
///
/// `hint` overrides the payload's own `source` field when the caller knows
/// which collaborator produced it.
pub fn normalize(payload: &Value, hint: Option<SourceType>) -> Result<EvidenceItem> {
  // Bare strings are accepted as text-only evidence.
  if let Value::String(text) = payload {
    return Ok(EvidenceItem::new(
      text.clone(),
      hint.unwrap_or(SourceType::Other),
      None,
      None,
    ));
  }

  let obj = payload.as_object().ok_or_else(|| {
    Error::UnrecognisedEvidence(format!("expected object, got {}", kind_of(payload)))
  })?;

  let text = TEXT_FIELDS
    .iter()
    .find_map(|f| obj.get(*f).and_then(Value::as_str))
    .map(str::to_owned);

  let url = URL_FIELDS
    .iter()
    .find_map(|f| obj.get(*f).and_then(Value::as_str))
    .or_else(|| {
      obj
        .get("citations")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(Value::as_str)
    })
    .map(str::to_owned);

  if text.is_none() && url.is_none() {
    return Err(Error::UnrecognisedEvidence(
      "payload has neither a text field nor a url".into(),
    ));
  }

  let timestamp = TIMESTAMP_FIELDS
    .iter()
    .filter_map(|f| obj.get(*f).and_then(Value::as_str))
    .find_map(parse_timestamp);

  let source_type = hint
    .or_else(|| {
      obj
        .get("source")
        .and_then(Value::as_str)
        .map(SourceType::from_hint)
    })
    .or_else(|| url.as_deref().map(SourceType::infer_from_url))
    .unwrap_or(SourceType::Other);

  Ok(EvidenceItem::new(text.unwrap_or_default(), source_type, url, timestamp))
}

/// Normalize a batch, skipping payloads that cannot be recognised and
/// truncating to `max_items` (the per-entity evidence budget).
pub fn normalize_batch(payloads: &[Value], max_items: usize) -> Vec<EvidenceItem> {
  if payloads.len() > max_items {
    tracing::warn!(
      received = payloads.len(),
      max_items,
      "evidence budget exceeded; truncating"
    );
  }

  payloads
    .iter()
    .take(max_items)
    .enumerate()
    .filter_map(|(index, payload)| match normalize(payload, None) {
      Ok(item) => Some(item),
      Err(e) => {
        tracing::warn!(index, error = %e, "skipping evidence payload");
        None
      }
    })
    .collect()
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (assumed UTC) and `YYYY-MM-DD`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
    return Some(naive.and_utc());
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

fn kind_of(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  #[test]
  fn brightdata_shape() {
    let item = normalize(
      &json!({
        "markdown":   "Club launches new ticketing app",
        "url":        "https://club.example.org/news/app",
        "scraped_at": "2025-07-14T10:00:00Z",
        "source":     "brightdata",
      }),
      None,
    )
    .unwrap();

    assert_eq!(item.text, "Club launches new ticketing app");
    assert_eq!(item.source_type, SourceType::Web);
    assert_eq!(item.url.as_deref(), Some("https://club.example.org/news/app"));
    assert_eq!(
      item.timestamp,
      Some(Utc.with_ymd_and_hms(2025, 7, 14, 10, 0, 0).unwrap())
    );
  }

  #[test]
  fn perplexity_shape_takes_first_citation() {
    let item = normalize(
      &json!({
        "answer":    "The club issued an RFP for a CRM platform.",
        "citations": ["https://tenders.example.net/123", "https://other"],
        "date":      "2025-03-01",
      }),
      Some(SourceType::Search),
    )
    .unwrap();

    assert_eq!(item.source_type, SourceType::Search);
    assert_eq!(item.url.as_deref(), Some("https://tenders.example.net/123"));
    assert_eq!(
      item.timestamp,
      Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
    );
  }

  #[test]
  fn linkedin_inferred_from_url() {
    let item = normalize(
      &json!({
        "title": "Head of Digital",
        "link":  "https://www.linkedin.com/in/someone",
      }),
      None,
    )
    .unwrap();
    assert_eq!(item.source_type, SourceType::LinkedIn);
  }

  #[test]
  fn plain_string_is_text_evidence() {
    let item = normalize(&json!("just text"), None).unwrap();
    assert_eq!(item.text, "just text");
    assert_eq!(item.source_type, SourceType::Other);
    assert!(item.url.is_none());
  }

  #[test]
  fn payload_without_text_or_url_is_rejected() {
    let err = normalize(&json!({ "score": 3 }), None).unwrap_err();
    assert!(matches!(err, Error::UnrecognisedEvidence(_)));

    let err = normalize(&json!(42), None).unwrap_err();
    assert!(matches!(err, Error::UnrecognisedEvidence(_)));
  }

  #[test]
  fn batch_skips_bad_payloads_and_applies_budget() {
    let payloads = vec![
      json!("one"),
      json!(null),
      json!({ "text": "two" }),
      json!({ "text": "three" }),
    ];
    let items = normalize_batch(&payloads, 3);
    let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two"]);
  }

  #[test]
  fn evidence_id_is_content_addressed() {
    let a = EvidenceItem::new("same", SourceType::Web, None, None);
    let b = EvidenceItem::new("same", SourceType::Web, None, None);
    let c = EvidenceItem::new("same", SourceType::News, None, None);
    assert_eq!(a.evidence_id, b.evidence_id);
    assert_ne!(a.evidence_id, c.evidence_id);
    assert_eq!(a.evidence_id.len(), 64);
  }

  #[test]
  fn unreadable_detection() {
    let binary: String = "%PDF\u{0}\u{1}\u{2}\u{fffd}\u{fffd}obj".into();
    assert!(EvidenceItem::new(binary, SourceType::Document, None, None).is_unreadable());

    let prose = "A perfectly ordinary sentence.\nWith a newline.";
    assert!(!EvidenceItem::new(prose, SourceType::Web, None, None).is_unreadable());
    assert!(!EvidenceItem::new("", SourceType::Web, None, None).is_unreadable());
  }
}
