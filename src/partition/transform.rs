//! Harvested post normalisation
//!
//! Turns raw post objects as returned by the content API into `Record`s
//! ready for the partition artifact: epoch seconds become UTC timestamps and
//! loosely-typed flags become canonical booleans.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Record;

/// A post as harvested, before normalisation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub score: i64,
    /// `false`, or the epoch time of the edit
    #[serde(default)]
    pub edited: Value,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub author: Option<String>,
    /// Epoch seconds
    pub created_utc: f64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub upvote_ratio: f64,
    #[serde(default)]
    pub over_18: Value,
    #[serde(default)]
    pub stickied: Value,
}

/// Errors raised while normalising a raw post
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// `created_utc` is not a representable instant
    #[error("Post {id}: invalid created_utc {value}")]
    InvalidTimestamp { id: String, value: f64 },

    /// A counter does not fit the table's integer column
    #[error("Post {id}: {field} value {value} out of range")]
    OutOfRange {
        id: String,
        field: &'static str,
        value: i64,
    },
}

/// Interpret a loosely-typed flag
///
/// `false`, `null`, `0`, `""` and the strings `"false"`/`"False"`/`"0"` are
/// false. Everything else, including an edit timestamp, is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !matches!(s.trim(), "" | "false" | "False" | "FALSE" | "0"),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Convert epoch seconds (possibly fractional) to a naive UTC timestamp
pub fn epoch_to_utc(seconds: f64) -> Option<NaiveDateTime> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999)).map(|dt| dt.naive_utc())
}

impl RawPost {
    /// Normalise into a `Record`
    pub fn into_record(self) -> Result<Record, TransformError> {
        let created_utc = epoch_to_utc(self.created_utc).ok_or(TransformError::InvalidTimestamp {
            id: self.id.clone(),
            value: self.created_utc,
        })?;
        let score = narrow(&self.id, "score", self.score)?;
        let num_comments = narrow(&self.id, "num_comments", self.num_comments)?;

        Ok(Record {
            edited: truthy(&self.edited),
            over_18: truthy(&self.over_18),
            stickied: truthy(&self.stickied),
            upvote_ratio: self.upvote_ratio.clamp(0.0, 1.0),
            author: self.author.unwrap_or_default(),
            id: self.id,
            title: self.title,
            score,
            num_comments,
            created_utc,
            url: self.url,
        })
    }
}

fn narrow(id: &str, field: &'static str, value: i64) -> Result<i32, TransformError> {
    i32::try_from(value).map_err(|_| TransformError::OutOfRange {
        id: id.to_string(),
        field,
        value,
    })
}

/// Normalise a batch of posts into one partition's records
///
/// A post id seen more than once keeps its last occurrence, in the position
/// of its first, so one artifact never carries two rows for the same key.
pub fn transform_posts(posts: Vec<RawPost>) -> Result<Vec<Record>, TransformError> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut records: Vec<Record> = Vec::with_capacity(posts.len());

    for post in posts {
        let record = post.into_record()?;
        match positions.get(&record.id) {
            Some(&index) => records[index] = record,
            None => {
                positions.insert(record.id.clone(), records.len());
                records.push(record);
            }
        }
    }

    Ok(records)
}
