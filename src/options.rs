//! Configuration for building and resolving a [`ModelSpec`](crate::ModelSpec).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::design::DesignMatrices;
use crate::error::BoxError;
use crate::splitting::SplitOptions;
use crate::table::Table;

/// Table transformation applied to the working copy before resolution.
pub type BeforeTransform = dyn Fn(Table) -> Result<Table, BoxError> + Send + Sync;

/// Matrix transformation applied to the resolved design.
pub type AfterTransform = dyn Fn(DesignMatrices) -> Result<DesignMatrices, BoxError> + Send + Sync;

/// Settings fixed when the spec is constructed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecOptions {
    /// Whether the design gets a constant `Intercept` column.
    pub include_intercept: bool,
    /// Check column references when features and targets are added instead of
    /// only at resolution time.
    pub eager_validation: bool,
}

impl SpecOptions {
    /// Include or omit the constant `Intercept` column.
    pub fn with_intercept(mut self, include_intercept: bool) -> Self {
        self.include_intercept = include_intercept;
        self
    }

    /// Enable or disable column checks at add time.
    pub fn with_eager_validation(mut self, eager_validation: bool) -> Self {
        self.eager_validation = eager_validation;
        self
    }
}

/// Per-call settings for [`ModelSpec::resolve_with`](crate::ModelSpec::resolve_with).
#[derive(Default)]
pub struct ResolveOptions {
    pub(crate) transform_before: Option<Box<BeforeTransform>>,
    pub(crate) transform_after: Option<Box<AfterTransform>>,
    pub(crate) split: Option<SplitOptions>,
}

impl ResolveOptions {
    /// No transforms and no split.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform the working table copy before the formula is evaluated.
    pub fn transform_before<F>(mut self, transform: F) -> Self
    where
        F: Fn(Table) -> Result<Table, BoxError> + Send + Sync + 'static,
    {
        self.transform_before = Some(Box::new(transform));
        self
    }

    /// Transform the resolved matrices before they are returned or split.
    pub fn transform_after<F>(mut self, transform: F) -> Self
    where
        F: Fn(DesignMatrices) -> Result<DesignMatrices, BoxError> + Send + Sync + 'static,
    {
        self.transform_after = Some(Box::new(transform));
        self
    }

    /// Enable or disable the default 80/20 split with seed 1.
    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split.then(SplitOptions::default);
        self
    }

    /// Split with custom settings.
    pub fn with_split_options(mut self, options: SplitOptions) -> Self {
        self.split = Some(options);
        self
    }

    /// Split settings, if a split was requested.
    pub fn split(&self) -> Option<&SplitOptions> {
        self.split.as_ref()
    }
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("transform_before", &self.transform_before.is_some())
            .field("transform_after", &self.transform_after.is_some())
            .field("split", &self.split)
            .finish()
    }
}
