use crate::types::{AccountId, Post, Result, Sentiment};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::io::Write;

/// Columns every dataset carries, in output order.
pub const BASE_COLUMNS: [&str; 6] = [
    "created_at",
    "text",
    "user_id",
    "user_screen_name",
    "favorite_count",
    "retweet_count",
];

/// Columns added once sentiment has been attached.
pub const SENTIMENT_COLUMNS: [&str; 2] = ["subjectivity", "polarity"];

/// Flattened projection of one post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuratedRow {
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub user_id: AccountId,
    pub user_screen_name: String,
    pub favorite_count: u64,
    pub retweet_count: u64,
    #[serde(flatten)]
    pub sentiment: Option<Sentiment>,
}

impl From<&Post> for CuratedRow {
    fn from(post: &Post) -> Self {
        Self {
            created_at: post.created_at,
            text: post.text.clone(),
            user_id: post.author.id.clone(),
            user_screen_name: post.author.screen_name.clone(),
            favorite_count: post.favorite_count,
            retweet_count: post.retweet_count,
            sentiment: None,
        }
    }
}

impl CuratedRow {
    fn record(&self, analysed: bool) -> Vec<String> {
        let mut record = vec![
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.text.clone(),
            self.user_id.to_string(),
            self.user_screen_name.clone(),
            self.favorite_count.to_string(),
            self.retweet_count.to_string(),
        ];
        if analysed {
            match self.sentiment {
                Some(sentiment) => {
                    record.push(sentiment.subjectivity.to_string());
                    record.push(sentiment.polarity.to_string());
                }
                None => record.extend([String::new(), String::new()]),
            }
        }
        record
    }
}

/// Tabular collection of curated rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<CuratedRow>,
}

impl Dataset {
    pub fn from_rows(rows: Vec<CuratedRow>) -> Self {
        Self { rows }
    }

    /// Normalizes posts into rows, preserving order.
    pub fn from_posts<'p>(posts: impl IntoIterator<Item = &'p Post>) -> Self {
        Self {
            rows: posts.into_iter().map(CuratedRow::from).collect(),
        }
    }

    pub fn rows(&self) -> &[CuratedRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [CuratedRow] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<CuratedRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extend(&mut self, other: Dataset) {
        self.rows.extend(other.rows);
    }

    /// True once any row carries sentiment.
    pub fn is_analysed(&self) -> bool {
        self.rows.iter().any(|row| row.sentiment.is_some())
    }

    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = BASE_COLUMNS.to_vec();
        if self.is_analysed() {
            columns.extend(SENTIMENT_COLUMNS);
        }
        columns
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let analysed = self.is_analysed();
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.columns())?;
        for row in &self.rows {
            csv.write_record(row.record(analysed))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Writes the rows as a JSON array of objects keyed by column name.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
