//! Seeded train/validation partitioning of resolved design matrices.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::design::DesignMatrices;
use crate::error::{Result, SpecError};

/// Configuration for [`train_validation_split`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitOptions {
    /// Share of rows held out for validation, strictly between 0 and 1.
    pub validation_fraction: f64,
    /// Seed of the row shuffle; a fixed seed makes splits reproducible.
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 1,
        }
    }
}

impl SplitOptions {
    /// Override the held-out fraction while keeping the default seed.
    pub fn with_validation_fraction(mut self, validation_fraction: f64) -> Self {
        self.validation_fraction = validation_fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of rows held out for validation out of `rows`.
    pub fn validation_rows(&self, rows: usize) -> usize {
        (self.validation_fraction * rows as f64).round() as usize
    }
}

/// Row-disjoint training and validation partitions.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainValidationSplit {
    pub train: DesignMatrices,
    pub validation: DesignMatrices,
}

impl TrainValidationSplit {
    /// Returns `(x_train, y_train, x_val, y_val)`.
    pub fn into_arrays(
        self,
    ) -> (
        nalgebra::DMatrix<f64>,
        nalgebra::DVector<f64>,
        nalgebra::DMatrix<f64>,
        nalgebra::DVector<f64>,
    ) {
        let (x_train, y_train) = self.train.into_parts();
        let (x_val, y_val) = self.validation.into_parts();
        (x_train, y_train, x_val, y_val)
    }
}

/// Shuffles rows with a seeded generator and holds out the first
/// `round(fraction * rows)` of them for validation.
///
/// The size is rounded, not ceiled, so tiny designs can round to an empty side
/// (with the default fraction, any design of one or two rows). Such splits are
/// rejected with [`SpecError::InvalidSplit`] instead of returning an empty
/// partition.
pub fn train_validation_split(
    design: &DesignMatrices,
    options: &SplitOptions,
) -> Result<TrainValidationSplit> {
    let rows = design.nrows();
    let fraction = options.validation_fraction;
    let invalid = || SpecError::InvalidSplit { rows, fraction };

    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(invalid());
    }
    let validation_rows = options.validation_rows(rows);
    if validation_rows == 0 || validation_rows == rows {
        return Err(invalid());
    }

    let mut order: Vec<usize> = (0..rows).collect();
    let mut rng = SmallRng::seed_from_u64(options.seed);
    order.shuffle(&mut rng);
    let (validation, train) = order.split_at(validation_rows);

    Ok(TrainValidationSplit {
        train: design.select_rows(train),
        validation: design.select_rows(validation),
    })
}
