//! Relevance classifier backed by the ML service.

use std::path::Path;

use async_trait::async_trait;

use postlist_ml_client::MlClient;

use crate::collaborators::ClassifierOracle;
use crate::error::WorkerResult;

pub struct MlClassifier {
    client: MlClient,
}

impl MlClassifier {
    pub fn new(client: MlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClassifierOracle for MlClassifier {
    async fn score(&self, frame: &Path) -> WorkerResult<f32> {
        Ok(self.client.classify_file(frame).await?)
    }
}
