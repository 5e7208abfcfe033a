//! Spatial indexing abstractions for player neighborhood queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from entry positions.
    fn rebuild(&mut self, positions: &[(f64, f64)]) -> Result<(), IndexError>;

    /// Visit entries within the provided squared radius of `origin`, passing
    /// each entry's index and its squared distance.
    fn neighbors_within(
        &self,
        origin: (f64, f64),
        radius_sq: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    );
}

/// Uniform grid index bucketing entries by cell coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing entries.
    pub cell_size: f64,
    #[serde(skip)]
    positions: Vec<(f64, f64)>,
    #[serde(skip)]
    buckets: HashMap<(i64, i64), Vec<usize>>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            positions: Vec::new(),
            buckets: HashMap::new(),
        }
    }

    fn cell_of(&self, position: (f64, f64)) -> (i64, i64) {
        (
            (position.0 / self.cell_size).floor() as i64,
            (position.1 / self.cell_size).floor() as i64,
        )
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f64, f64)]) -> Result<(), IndexError> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.buckets.clear();
        for (idx, position) in positions.iter().enumerate() {
            let cell = self.cell_of(*position);
            self.buckets.entry(cell).or_default().push(idx);
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        origin: (f64, f64),
        radius_sq: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    ) {
        if radius_sq < 0.0 || self.positions.is_empty() {
            return;
        }
        let radius = radius_sq.sqrt();
        let (min_cx, min_cy) = self.cell_of((origin.0 - radius, origin.1 - radius));
        let (max_cx, max_cy) = self.cell_of((origin.0 + radius, origin.1 + radius));
        for cy in min_cy..=max_cy {
            for cx in min_cx..=max_cx {
                let Some(bucket) = self.buckets.get(&(cx, cy)) else {
                    continue;
                };
                for &idx in bucket {
                    let (x, y) = self.positions[idx];
                    let dx = x - origin.0;
                    let dy = y - origin.1;
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq <= radius_sq {
                        visitor(idx, OrderedFloat(dist_sq));
                    }
                }
            }
        }
    }
}
