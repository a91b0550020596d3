use crate::core::options::RadarOptions;
use crate::types::PpcResult;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Source of recently observed melting layer heights
pub trait MeltingLayerProvider: Send + Sync {
    /// Most recent melting layer bottom height (km) observed for `node` no
    /// older than `max_age`, or `None` if there is none
    fn bottom_height(&self, node: &str, max_age: Duration) -> PpcResult<Option<f64>>;
}

/// One melting layer observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeltingLayerObservation {
    pub observed: DateTime<Utc>,
    /// Bottom height (km)
    pub bottom_height: f64,
}

/// In-memory melting layer observations per radar node
#[derive(Debug, Clone, Default)]
pub struct MeltingLayerHistory {
    observations: HashMap<String, Vec<MeltingLayerObservation>>,
}

impl MeltingLayerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node: impl Into<String>, observed: DateTime<Utc>, bottom_height: f64) {
        self.observations
            .entry(node.into())
            .or_default()
            .push(MeltingLayerObservation {
                observed,
                bottom_height,
            });
    }

    /// Latest observation for `node` at most `max_age` older than `now`
    pub fn most_recent(
        &self,
        node: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Option<MeltingLayerObservation> {
        self.observations
            .get(node)?
            .iter()
            .filter(|o| now.signed_duration_since(o.observed) <= max_age)
            .max_by_key(|o| o.observed)
            .copied()
    }
}

impl MeltingLayerProvider for MeltingLayerHistory {
    fn bottom_height(&self, node: &str, max_age: Duration) -> PpcResult<Option<f64>> {
        Ok(self
            .most_recent(node, Utc::now(), max_age)
            .map(|o| o.bottom_height))
    }
}

/// Replace the melting layer height in `options` with a recent observation
/// if the provider has one. Lookup failures are logged and leave the
/// configured height in place.
pub fn apply_melting_layer(options: &mut RadarOptions, node: &str, provider: &dyn MeltingLayerProvider) {
    let max_age = Duration::hours(options.melting_layer_hour_threshold);
    match provider.bottom_height(node, max_age) {
        Ok(Some(height)) => {
            log::info!("Using observed melting layer height {} km for {}", height, node);
            options.melting_layer_bottom_height = height;
        }
        Ok(None) => {
            log::debug!(
                "No melting layer observation for {} within {} h, using {} km",
                node,
                options.melting_layer_hour_threshold,
                options.melting_layer_bottom_height
            );
        }
        Err(e) => {
            log::warn!(
                "Melting layer lookup for {} failed ({}), using {} km",
                node,
                e,
                options.melting_layer_bottom_height
            );
        }
    }
}
