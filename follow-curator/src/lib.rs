pub mod types;
pub mod traits;
pub mod cursor;
pub mod relationships;
pub mod fetcher;
pub mod curator;
pub mod sentiment;
pub mod dataset;
pub mod processing;
pub mod pipeline;
pub mod client;

pub use types::*;
pub use traits::{Sleeper, TokioSleeper};
pub use cursor::{RateLimitPolicy, RateLimitedCursor};
pub use relationships::{list_followings, Followings};
pub use fetcher::{FetchWindow, RecentPostFetcher, StopReason};
pub use curator::{decide, CurationReport, Curator, Decision, UnfollowReason, Verdict};
pub use sentiment::{clean_text, LexiconSentiment};
pub use dataset::{CuratedRow, Dataset, BASE_COLUMNS, SENTIMENT_COLUMNS};
pub use processing::{analyse, SentimentStage};
pub use pipeline::Harvester;
pub use client::TwitterClient;
