//! Post record model
//!
//! A `Record` is one harvested content item. The field order here is the
//! column order of the partition artifact and of the warehouse table.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Column names in artifact/table order
pub const RECORD_COLUMNS: [&str; 11] = [
    "id",
    "title",
    "score",
    "edited",
    "num_comments",
    "author",
    "created_utc",
    "url",
    "upvote_ratio",
    "over_18",
    "stickied",
];

/// Timestamp layout used in artifacts and when reading rows back as text
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Load error code for a value that does not parse as a number
pub const ERR_INVALID_DIGIT: i32 = 1207;
/// Load error code for a malformed timestamp
pub const ERR_INVALID_TIMESTAMP: i32 = 1206;
/// Load error code for a value that is not a recognised boolean
pub const ERR_INVALID_BOOLEAN: i32 = 1216;
/// Load error code for a row with too few columns
pub const ERR_MISSING_COLUMNS: i32 = 1214;
/// Load error code for a row with too many columns
pub const ERR_EXTRA_COLUMNS: i32 = 1202;
/// Load error code for a row the CSV reader cannot split (bad quoting)
pub const ERR_MALFORMED_ROW: i32 = 1213;
/// Load error code for a key that occurs more than once in one partition
pub const ERR_DUPLICATE_KEY: i32 = 1251;

/// One content item keyed by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique post identifier
    pub id: String,
    pub title: String,
    pub score: i32,
    pub edited: bool,
    pub num_comments: i32,
    pub author: String,
    /// Creation time (UTC), derived from epoch seconds at harvest time
    pub created_utc: NaiveDateTime,
    pub url: String,
    /// Fraction of upvotes, in [0, 1]
    pub upvote_ratio: f64,
    /// Restricted (NSFW) flag
    pub over_18: bool,
    /// Pinned flag
    pub stickied: bool,
}

/// A single field that failed type coercion
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("column {column} ({column_type}): {reason}, value '{value}'")]
pub struct FieldError {
    /// Column name
    pub column: String,
    /// Declared column type
    pub column_type: String,
    /// Raw offending value
    pub value: String,
    /// Load error code
    pub code: i32,
    /// Human-readable reason
    pub reason: String,
}

impl FieldError {
    fn new(column: &str, column_type: &str, value: &str, code: i32, reason: &str) -> Self {
        Self {
            column: column.to_string(),
            column_type: column_type.to_string(),
            value: value.to_string(),
            code,
            reason: reason.to_string(),
        }
    }
}

impl Record {
    /// Build a record from positional text fields
    ///
    /// Coercion follows the warehouse's bulk-load rules: integers and floats
    /// must parse fully, booleans accept the usual truthy/falsy spellings, and
    /// timestamps use `YYYY-MM-DD HH:MM:SS` with optional fractional seconds.
    pub fn from_text_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self, FieldError> {
        if fields.len() < RECORD_COLUMNS.len() {
            let missing = RECORD_COLUMNS[fields.len()];
            return Err(FieldError::new(
                missing,
                "",
                "",
                ERR_MISSING_COLUMNS,
                "Delimiter not found",
            ));
        }
        if fields.len() > RECORD_COLUMNS.len() {
            let extra = fields[RECORD_COLUMNS.len()].as_ref();
            return Err(FieldError::new(
                "",
                "",
                extra,
                ERR_EXTRA_COLUMNS,
                "Extra column(s) found",
            ));
        }

        let f = |i: usize| fields[i].as_ref();

        Ok(Self {
            id: f(0).to_string(),
            title: f(1).to_string(),
            score: parse_int(RECORD_COLUMNS[2], f(2))?,
            edited: parse_bool(RECORD_COLUMNS[3], f(3))?,
            num_comments: parse_int(RECORD_COLUMNS[4], f(4))?,
            author: f(5).to_string(),
            created_utc: parse_timestamp(RECORD_COLUMNS[6], f(6))?,
            url: f(7).to_string(),
            upvote_ratio: parse_float(RECORD_COLUMNS[8], f(8))?,
            over_18: parse_bool(RECORD_COLUMNS[9], f(9))?,
            stickied: parse_bool(RECORD_COLUMNS[10], f(10))?,
        })
    }

    /// Render the record as positional text fields
    pub fn to_text_fields(&self) -> [String; 11] {
        [
            self.id.clone(),
            self.title.clone(),
            self.score.to_string(),
            self.edited.to_string(),
            self.num_comments.to_string(),
            self.author.clone(),
            self.created_utc.format(TIMESTAMP_FORMAT).to_string(),
            self.url.clone(),
            self.upvote_ratio.to_string(),
            self.over_18.to_string(),
            self.stickied.to_string(),
        ]
    }
}

/// Parse a boolean the way the warehouse's bulk loader does
pub fn parse_bool_text(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "y" | "yes" => Some(true),
        "false" | "f" | "0" | "n" | "no" => Some(false),
        _ => None,
    }
}

fn parse_bool(column: &str, value: &str) -> Result<bool, FieldError> {
    parse_bool_text(value).ok_or_else(|| {
        FieldError::new(
            column,
            "bool",
            value,
            ERR_INVALID_BOOLEAN,
            "Invalid boolean value",
        )
    })
}

fn parse_int(column: &str, value: &str) -> Result<i32, FieldError> {
    value.trim().parse::<i32>().map_err(|_| {
        FieldError::new(
            column,
            "int4",
            value,
            ERR_INVALID_DIGIT,
            "Invalid digit, Value out of range or non-numeric",
        )
    })
}

fn parse_float(column: &str, value: &str) -> Result<f64, FieldError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            FieldError::new(column, "float8", value, ERR_INVALID_DIGIT, "Invalid digit")
        })
}

fn parse_timestamp(column: &str, value: &str) -> Result<NaiveDateTime, FieldError> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| {
            FieldError::new(
                column,
                "timestamp",
                value,
                ERR_INVALID_TIMESTAMP,
                "Invalid timestamp format or value",
            )
        })
}
