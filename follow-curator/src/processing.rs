use crate::dataset::Dataset;
use crate::types::SentimentOracle;
use std::sync::Arc;
use tracing::debug;

/// Scores every row of a dataset.
///
/// Rows are independent; the oracle is called once per row on its text and
/// both scalars are written back together.
pub fn analyse(mut dataset: Dataset, oracle: &dyn SentimentOracle) -> Dataset {
    for row in dataset.rows_mut() {
        row.sentiment = Some(oracle.score(&row.text));
    }
    dataset
}

/// Pipeline stage wrapping a sentiment oracle.
#[derive(Clone)]
pub struct SentimentStage {
    oracle: Arc<dyn SentimentOracle>,
}

impl SentimentStage {
    pub fn new(oracle: Arc<dyn SentimentOracle>) -> Self {
        Self { oracle }
    }

    pub fn stage_name(&self) -> String {
        "sentiment".to_string()
    }

    pub fn process(&self, dataset: Dataset) -> Dataset {
        debug!("Processing {} rows in {} stage", dataset.len(), self.stage_name());
        let analysed = analyse(dataset, self.oracle.as_ref());

        if !analysed.is_empty() {
            let n = analysed.len() as f64;
            let (polarity, subjectivity) = analysed
                .rows()
                .iter()
                .filter_map(|row| row.sentiment)
                .fold((0.0, 0.0), |(p, s), sentiment| (p + sentiment.polarity, s + sentiment.subjectivity));
            debug!(
                "Mean polarity {:.3}, mean subjectivity {:.3} over {} rows",
                polarity / n,
                subjectivity / n,
                analysed.len()
            );
        }

        analysed
    }
}
