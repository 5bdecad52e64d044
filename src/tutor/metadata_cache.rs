use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::tutor::collaborators::QuestionMetadataSource;
use crate::tutor::types::QuestionMetadata;

struct CachedEntry {
    metadata: QuestionMetadata,
    fetched_at: Instant,
}

/// TTL cache in front of a metadata source; backend errors read as a miss.
pub struct MetadataCache {
    source: Arc<dyn QuestionMetadataSource>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl MetadataCache {
    pub fn new(source: Arc<dyn QuestionMetadataSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, question_id: &str) -> Option<QuestionMetadata> {
        if let Some(hit) = self.fresh(question_id) {
            return Some(hit);
        }

        match self.source.fetch(question_id).await {
            Ok(Some(metadata)) => {
                self.entries.lock().insert(
                    question_id.to_string(),
                    CachedEntry {
                        metadata: metadata.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Some(metadata)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, question_id, "metadata fetch failed");
                None
            }
        }
    }

    pub fn invalidate(&self, question_id: &str) {
        self.entries.lock().remove(question_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn fresh(&self, question_id: &str) -> Option<QuestionMetadata> {
        let mut entries = self.entries.lock();
        match entries.get(question_id) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.metadata.clone()),
            Some(_) => {
                entries.remove(question_id);
                None
            }
            None => None,
        }
    }
}
