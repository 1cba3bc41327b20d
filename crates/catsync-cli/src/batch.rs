//! Batching of lookups
//!
//! Splits the work list into fixed-size batches and performs one API request
//! per batch. Error classification happens in the API client; this layer
//! adds the bookkeeping of which requested keys came back.

use crate::api::EnrichmentApi;
use crate::error::Result;
use crate::selector::WorkList;
use catsync_common::EnrichmentResult;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// An ordered slice of the work list submitted in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based batch number within the run
    pub index: usize,
    pub keys: Vec<String>,
}

/// What one batch request produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchFetch {
    pub results: Vec<EnrichmentResult>,
    /// Requested keys the API did not return, in request order
    pub skipped: Vec<String>,
}

/// Split `keys` into consecutive batches of at most `size` keys
///
/// A size of zero is treated as one.
pub fn partition(keys: &[String], size: usize) -> Vec<Batch> {
    keys.chunks(size.max(1))
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            keys: chunk.to_vec(),
        })
        .collect()
}

pub struct BatchClient {
    api: Arc<dyn EnrichmentApi>,
    batch_size: usize,
}

impl BatchClient {
    pub fn new(api: Arc<dyn EnrichmentApi>, batch_size: usize) -> Self {
        Self { api, batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn partition(&self, work: &WorkList) -> Vec<Batch> {
        partition(work.keys(), self.batch_size)
    }

    /// Request one batch; no retries
    pub async fn fetch(&self, batch: &Batch) -> Result<BatchFetch> {
        let results = self.api.request_products(&batch.keys).await?;

        let returned: HashSet<&str> = results.iter().map(|r| r.key.as_str()).collect();
        let mut seen = HashSet::new();
        let skipped: Vec<String> = batch
            .keys
            .iter()
            .filter(|key| !returned.contains(key.as_str()) && seen.insert(key.as_str()))
            .cloned()
            .collect();

        debug!(
            batch = batch.index,
            requested = batch.keys.len(),
            returned = results.len(),
            skipped = skipped.len(),
            "Fetched batch"
        );
        Ok(BatchFetch { results, skipped })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod testing {
    //! Scripted API used by unit tests across the crate

    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers each call with the next scripted response
    ///
    /// `Ok(keys)` returns a result for every requested key found in `keys`.
    #[derive(Default)]
    pub struct ScriptedApi {
        script: Mutex<VecDeque<std::result::Result<Vec<&'static str>, SyncError>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedApi {
        pub fn new(script: Vec<std::result::Result<Vec<&'static str>, SyncError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EnrichmentApi for ScriptedApi {
        async fn request_products(&self, keys: &[String]) -> Result<Vec<EnrichmentResult>> {
            self.calls.lock().unwrap().push(keys.to_vec());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(known)) => Ok(keys
                    .iter()
                    .filter(|k| known.contains(&k.as_str()))
                    .map(|k| {
                        EnrichmentResult::new(k.clone())
                            .with_field("title", format!("Title {}", k))
                            .with_field("buybox_price", 1000_i64)
                            .with_field("url", format!("https://example.test/dp/{}", k))
                    })
                    .collect()),
                Some(Err(err)) => Err(err),
                None => Err(SyncError::transport(None, "script exhausted")),
            }
        }
    }
}
