//! Fixed-column view over fetched tweets.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{TweetError, TweetResult};
use crate::feeds::Record;

/// Keys that mark a streamed line as a control notice rather than a status.
const CONTROL_KEYS: &[&str] = &[
    "limit",
    "delete",
    "scrub_geo",
    "status_withheld",
    "user_withheld",
    "disconnect",
    "warning",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub text: String,
    pub id: String,
    /// Character count of `text`.
    pub len: usize,
    pub date: DateTime<Utc>,
    pub source: String,
    pub n_likes: u64,
    pub n_retweets: u64,
}

impl From<&Record> for Row {
    fn from(record: &Record) -> Self {
        Self {
            text: record.text.clone(),
            id: record.id.clone(),
            len: record.text.chars().count(),
            date: record.created_at,
            source: record.source.clone(),
            n_likes: record.like_count,
            n_retweets: record.retweet_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

/// One row per record, in input order.
pub fn normalize(records: &[Record]) -> Table {
    Table {
        rows: records.iter().map(Row::from).collect(),
    }
}

/// Normalizes raw status objects, failing on the first malformed one.
pub fn normalize_values<I>(values: I) -> TweetResult<Table>
where
    I: IntoIterator<Item = serde_json::Value>,
{
    let records = values
        .into_iter()
        .map(Record::from_value)
        .collect::<TweetResult<Vec<_>>>()?;
    Ok(normalize(&records))
}

fn is_control_message(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| CONTROL_KEYS.iter().any(|key| obj.contains_key(*key)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub mean_len: f64,
    pub max_likes: u64,
    pub max_retweets: u64,
}

impl Table {
    /// Reloads a stream sink: one JSON message per line, control notices
    /// and blank lines skipped.
    pub fn from_sink_file(path: &Path) -> TweetResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut values = Vec::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&line)?;
            if is_control_message(&value) {
                skipped += 1;
                continue;
            }
            values.push(value);
        }

        debug!(
            path = %path.display(),
            statuses = values.len(),
            skipped,
            "loaded sink file"
        );
        normalize_values(values)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn text_lengths(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.len).collect()
    }

    pub fn likes_series(&self) -> Vec<(DateTime<Utc>, u64)> {
        self.rows.iter().map(|r| (r.date, r.n_likes)).collect()
    }

    pub fn retweets_series(&self) -> Vec<(DateTime<Utc>, u64)> {
        self.rows.iter().map(|r| (r.date, r.n_retweets)).collect()
    }

    pub fn summary(&self) -> Summary {
        let total: usize = self.rows.iter().map(|r| r.len).sum();
        Summary {
            rows: self.rows.len(),
            mean_len: if self.rows.is_empty() {
                0.0
            } else {
                total as f64 / self.rows.len() as f64
            },
            max_likes: self.rows.iter().map(|r| r.n_likes).max().unwrap_or(0),
            max_retweets: self.rows.iter().map(|r| r.n_retweets).max().unwrap_or(0),
        }
    }

    /// Writes the rows as a pretty-printed JSON array.
    pub fn write_json(&self, path: &Path) -> TweetResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(TweetError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn record(id: u64, text: &str, likes: u64, retweets: u64) -> Record {
        Record {
            id: id.to_string(),
            text: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2019, 3, 1, 12, 0, id as u32 % 60).unwrap(),
            source: "Twitter for Android".to_string(),
            like_count: likes,
            retweet_count: retweets,
        }
    }

    #[test]
    fn test_row_count_and_order_preserved() {
        let records: Vec<Record> = (0..25).map(|i| record(100 - i, "t", i, 0)).collect();
        let table = normalize(&records);

        assert_eq!(table.len(), records.len());
        let ids: Vec<&str> = table.rows().iter().map(|r| r.id.as_str()).collect();
        let expected: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_text_lengths_example() {
        let records = vec![
            record(1, "0123456789", 0, 0),
            record(2, "", 0, 0),
            record(3, &"x".repeat(280), 0, 0),
        ];
        assert_eq!(normalize(&records).text_lengths(), vec![10, 0, 280]);
    }

    #[test]
    fn test_len_counts_characters_not_bytes() {
        let table = normalize(&[record(1, "café 🐦", 0, 0)]);
        assert_eq!(table.rows()[0].len, 6);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let records = vec![record(1, "a", 3, 4), record(2, "bb", 5, 6)];
        assert_eq!(normalize(&records), normalize(&records));
    }

    #[test]
    fn test_empty_input() {
        let table = normalize(&[]);
        assert!(table.is_empty());
        assert_eq!(
            table.summary(),
            Summary {
                rows: 0,
                mean_len: 0.0,
                max_likes: 0,
                max_retweets: 0
            }
        );
    }

    #[test]
    fn test_summary_and_series() {
        let records = vec![record(1, "ab", 10, 1), record(2, "abcd", 3, 9)];
        let table = normalize(&records);
        let summary = table.summary();

        assert_eq!(summary.rows, 2);
        assert!((summary.mean_len - 3.0).abs() < f64::EPSILON);
        assert_eq!(summary.max_likes, 10);
        assert_eq!(summary.max_retweets, 9);
        assert_eq!(table.likes_series()[1], (records[1].created_at, 3));
        assert_eq!(table.retweets_series()[0], (records[0].created_at, 1));
    }

    #[test]
    fn test_normalize_values_reports_missing_field() {
        let values = vec![serde_json::json!({
            "id_str": "1",
            "text": "hi",
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "favorite_count": 0,
            "retweet_count": 0
        })];
        match normalize_values(values).unwrap_err() {
            TweetError::Schema(msg) => assert!(msg.contains("source")),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_sink_file_skips_control_messages() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}\r\n\r\n{}\r\n{}\r\n",
            r#"{"id_str":"1","text":"first","created_at":"Wed Oct 10 20:19:24 +0000 2018","source":"web","favorite_count":2,"retweet_count":1}"#,
            r#"{"limit":{"track":12,"timestamp_ms":"1539202764000"}}"#,
            r#"{"id_str":"2","text":"trunc","extended_tweet":{"full_text":"second, in full"},"created_at":"Wed Oct 10 20:19:25 +0000 2018","source":"web","favorite_count":0,"retweet_count":0}"#,
        )
        .unwrap();

        let table = Table::from_sink_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].text, "second, in full");
        assert_eq!(table.rows()[1].len, 15);
    }

    #[test]
    fn test_write_json_round_trips_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        normalize(&[record(7, "hello", 1, 2)]).write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let row = &value[0];
        assert_eq!(row["id"], "7");
        assert_eq!(row["len"], 5);
        assert_eq!(row["n_likes"], 1);
        assert_eq!(row["n_retweets"], 2);
    }
}
