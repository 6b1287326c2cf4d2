//! Cluster Discovery
//!
//! Groups an owner's indexed, active memory items by density in embedding
//! space. Noise points are dropped; each surviving cluster carries its member
//! ids and the arithmetic mean of the member vectors.

pub mod hdbscan;

pub use hdbscan::HdbscanParams;

use crate::config::ClusteringConfig;
use crate::{SDKError, SDKResult};
use mnemos_core::Database;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A dense group of memory items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub members: Vec<String>,
    /// Mean of member vectors, not re-normalised
    pub centroid: Vec<f32>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Runs density clustering over stored embeddings
pub struct ClusterDiscovery {
    db: Arc<Database>,
    params: HdbscanParams,
    model: Option<String>,
}

impl ClusterDiscovery {
    pub fn new(db: Arc<Database>, config: &ClusteringConfig) -> Self {
        Self {
            db,
            params: HdbscanParams {
                min_cluster_size: config.min_cluster_size,
                min_samples: config.min_samples,
                allow_single_cluster: config.allow_single_cluster,
            },
            model: None,
        }
    }

    /// Only cluster vectors produced by `model`
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn min_cluster_size(&self) -> usize {
        self.params.min_cluster_size
    }

    /// Discover clusters for one owner
    ///
    /// Returns an empty list when the owner has fewer indexed active items
    /// than `min_cluster_size`.
    pub async fn discover(&self, owner_id: &str) -> SDKResult<Vec<Cluster>> {
        let rows = self.db.active_embeddings(owner_id, self.model.as_deref())?;
        if rows.len() < self.params.min_cluster_size {
            debug!(
                owner_id,
                indexed = rows.len(),
                min_cluster_size = self.params.min_cluster_size,
                "not enough indexed items to cluster"
            );
            return Ok(Vec::new());
        }

        let (ids, vectors): (Vec<String>, Vec<Vec<f32>>) = rows.into_iter().unzip();
        let params = self.params.clone();

        // Clustering is CPU bound; keep it off the async workers
        let (labels, vectors) = tokio::task::spawn_blocking(move || {
            let labels = hdbscan::cluster(&vectors, &params);
            (labels, vectors)
        })
        .await
        .map_err(|e| SDKError::Other(anyhow::anyhow!("clustering task failed: {e}")))?;

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, label) in labels.iter().enumerate() {
            if let Some(label) = label {
                groups.entry(*label).or_default().push(index);
            }
        }

        let clusters: Vec<Cluster> = groups
            .into_values()
            .map(|indexes| Cluster {
                members: indexes.iter().map(|i| ids[*i].clone()).collect(),
                centroid: centroid(indexes.iter().map(|i| vectors[*i].as_slice())),
            })
            .collect();

        debug!(
            owner_id,
            points = ids.len(),
            clusters = clusters.len(),
            noise = labels.iter().filter(|l| l.is_none()).count(),
            "clustering finished"
        );
        Ok(clusters)
    }
}

/// Arithmetic mean of vectors
pub fn centroid<'a>(vectors: impl IntoIterator<Item = &'a [f32]>) -> Vec<f32> {
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for v in vectors {
        if sum.is_empty() {
            sum = vec![0.0; v.len()];
        }
        for (s, x) in sum.iter_mut().zip(v.iter()) {
            *s += x;
        }
        count += 1;
    }
    if count > 0 {
        for s in &mut sum {
            *s /= count as f32;
        }
    }
    sum
}
