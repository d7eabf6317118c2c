use crate::batch::{TestBatch, TrainBatch};
use crate::config::DetectorConfig;

/// Producer of batched windows for training and inference.
///
/// Batches are pre-chunked to `config.train.batch_size`; only the last batch may be shorter.
pub trait WindowSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn train_batches(
        &self,
        config: &DetectorConfig,
        shuffle: bool,
    ) -> Result<Vec<TrainBatch>, Self::Error>;

    fn test_batches(&self, config: &DetectorConfig) -> Result<Vec<TestBatch>, Self::Error>;
}
