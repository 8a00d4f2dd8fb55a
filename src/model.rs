//! The incrementally built model specification.

use std::fmt;
use std::path::PathBuf;

use log::debug;

use crate::design::{self, DesignMatrices};
use crate::error::{ResolutionError, Result, SpecError};
use crate::formulation::{Arg, ExtraArgs, Fragment, Term};
use crate::options::{ResolveOptions, SpecOptions};
use crate::registry::{FunctionRegistry, Transform};
use crate::splitting::{self, SplitOptions, TrainValidationSplit};
use crate::table::{CsvSource, Table, TableSource};

/// Builder for `target ~ featureA + featureB + ...` design matrices over a table.
///
/// Every `add_*` call pushes one [`Fragment`]; [`undo_add_operation`](Self::undo_add_operation)
/// pops one. Column references are only checked at resolution time unless
/// [`SpecOptions::eager_validation`] is set.
#[derive(Debug)]
pub struct ModelSpec {
    source: Box<dyn TableSource>,
    table: Table,
    fragments: Vec<Fragment>,
    target: Option<String>,
    registry: FunctionRegistry,
    options: SpecOptions,
}

/// Outcome of [`ModelSpec::resolve_with`].
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Full(DesignMatrices),
    Split(TrainValidationSplit),
}

impl ModelSpec {
    /// Loads the CSV file at `path` as the backing table.
    pub fn from_csv(path: impl Into<PathBuf>, include_intercept: bool) -> Result<Self> {
        Self::with_source(
            CsvSource::new(path),
            SpecOptions::default().with_intercept(include_intercept),
        )
    }

    /// Loads the backing table from `source`; `reset` reloads from the same source.
    pub fn with_source<S>(source: S, options: SpecOptions) -> Result<Self>
    where
        S: TableSource + 'static,
    {
        let table = source
            .load()
            .map_err(|err| SpecError::data_source(source.origin(), err))?;
        Ok(Self {
            source: Box::new(source),
            table,
            fragments: Vec::new(),
            target: None,
            registry: FunctionRegistry::new(),
            options,
        })
    }

    /// The backing table as last loaded.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Target column name, if set.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Fragments in the order they were added.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// All terms across fragments, in order.
    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.fragments.iter().flat_map(|fragment| fragment.terms())
    }

    /// Transforms registered so far; kept across resets.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Settings fixed at construction.
    pub fn options(&self) -> &SpecOptions {
        &self.options
    }

    /// Adds a column as a feature.
    pub fn add_feature(&mut self, column: &str) -> Result<&mut Self> {
        let term = Term::column(column);
        self.check_columns(&term)?;
        self.push(Fragment::single(term));
        Ok(self)
    }

    /// Registers `transform` and adds one term per argument list in `extra`, all in a
    /// single fragment.
    ///
    /// ```no_run
    /// # use designspec::{Arg, ExtraArgs, ModelSpec, Transform};
    /// # fn main() -> designspec::Result<()> {
    /// let mut spec = ModelSpec::from_csv("bikes.csv", false)?;
    /// let power = Transform::new("power", |args| args[0].powf(args[1]));
    /// // power(temp, 2) + power(temp, 3), undone together
    /// spec.add_function_feature(power, "temp", vec![2, 3])?;
    ///
    /// let is_season = Transform::new("is_season", |args| args[0] * f64::from(u8::from(args[1] == args[2])));
    /// spec.add_function_feature(is_season, "temp", ExtraArgs::tuples(vec![
    ///     vec![Arg::from("season"), Arg::from(1)],
    ///     vec![Arg::from("season"), Arg::from(2)],
    /// ]))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_function_feature(
        &mut self,
        transform: Transform,
        column: &str,
        extra: impl Into<ExtraArgs>,
    ) -> Result<&mut Self> {
        let name = transform.name().to_string();
        let terms: Vec<Term> = extra
            .into()
            .into_arg_lists()
            .into_iter()
            .map(|args: Vec<Arg>| Term::call(name.as_str(), column, args))
            .collect();
        if let Some(value) = terms.iter().find_map(non_finite_literal) {
            return Err(SpecError::NonFiniteArgument {
                function: name,
                value,
            });
        }
        for term in &terms {
            self.check_columns(term)?;
        }

        self.registry.register(transform);
        self.push(Fragment::new(terms));
        Ok(self)
    }

    /// Adds every table column except the target, one fragment per column.
    pub fn add_all_features_but_target(&mut self) -> Result<&mut Self> {
        let target = self.target.as_deref().ok_or(SpecError::UnsetTarget)?;
        let columns: Vec<Fragment> = self
            .table
            .column_names()
            .filter(|name| *name != target)
            .map(|name| Fragment::single(Term::column(name)))
            .collect();
        for fragment in columns {
            self.push(fragment);
        }
        Ok(self)
    }

    /// Sets the target column, replacing any previous one.
    pub fn add_target(&mut self, column: &str) -> Result<&mut Self> {
        self.check_columns(&Term::column(column))?;
        self.target = Some(column.to_string());
        debug!("{self}");
        Ok(self)
    }

    /// Removes the most recent fragment. Does nothing and returns `None` when there is
    /// nothing to undo.
    pub fn undo_add_operation(&mut self) -> Option<Fragment> {
        let popped = self.fragments.pop();
        if popped.is_none() {
            debug!("nothing to undo");
        }
        debug!("{self}");
        popped
    }

    /// Reloads the table and clears the features, and the target unless `keep_target`.
    /// Registered transforms are kept. On a failed reload nothing changes.
    pub fn reset(&mut self, keep_target: bool) -> Result<()> {
        self.table = self
            .source
            .load()
            .map_err(|err| SpecError::data_source(self.source.origin(), err))?;
        self.fragments.clear();
        if !keep_target {
            self.target = None;
        }
        debug!("{self}");
        Ok(())
    }

    /// Full formula string, e.g. `count ~ -1 + temp + square(temp)`.
    pub fn formula(&self) -> Result<String> {
        let target = self.target.as_deref().ok_or(SpecError::UnsetTarget)?;
        if self.fragments.is_empty() {
            return Err(SpecError::EmptyFormula);
        }
        Ok(self.render(target))
    }

    fn render(&self, target: &str) -> String {
        let marker = if self.options.include_intercept { "1" } else { "-1" };
        let mut formula = format!("{} ~ {marker}", Term::column(target));
        for fragment in &self.fragments {
            formula.push(' ');
            formula.push_str(&fragment.to_string());
        }
        formula
    }

    /// Resolves into the full feature matrix and target vector.
    pub fn resolve(&self) -> Result<DesignMatrices> {
        self.resolve_design(&ResolveOptions::default())
    }

    /// Resolves and splits with the default 80/20 split and seed 1.
    pub fn resolve_split(&self) -> Result<TrainValidationSplit> {
        let design = self.resolve()?;
        splitting::train_validation_split(&design, &SplitOptions::default())
    }

    /// Resolves with optional transforms before and after evaluation and an optional split.
    pub fn resolve_with(&self, options: &ResolveOptions) -> Result<Resolution> {
        let design = self.resolve_design(options)?;
        match options.split() {
            Some(split) => {
                splitting::train_validation_split(&design, split).map(Resolution::Split)
            }
            None => Ok(Resolution::Full(design)),
        }
    }

    fn resolve_design(&self, options: &ResolveOptions) -> Result<DesignMatrices> {
        let formula = self.formula()?;

        let mut table = self.table.clone();
        if let Some(before) = &options.transform_before {
            table = before(table).map_err(SpecError::Preprocessing)?;
        }

        debug!("resolving `{formula}`");
        let mut design = design::evaluate(&formula, &table, &self.registry)?;

        if let Some(after) = &options.transform_after {
            design = after(design).map_err(SpecError::Postprocessing)?;
        }
        debug!(
            "resolved {} rows x {} features",
            design.nrows(),
            design.ncols()
        );
        Ok(design)
    }

    fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
        debug!("{self}");
    }

    fn check_columns(&self, term: &Term) -> Result<()> {
        if !self.options.eager_validation {
            return Ok(());
        }
        match term
            .referenced_columns()
            .into_iter()
            .find(|name| !self.table.has_column(name))
        {
            Some(name) => Err(ResolutionError::unknown_column(name).into()),
            None => Ok(()),
        }
    }
}

fn non_finite_literal(term: &Term) -> Option<f64> {
    match term {
        Term::Call { args, .. } => args.iter().find_map(|arg| match arg {
            Arg::Value(value) if !value.is_finite() => Some(*value),
            _ => None,
        }),
        Term::Column { .. } => None,
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.target, self.fragments.is_empty()) {
            (Some(target), false) => write!(f, "ModelSpec({})", self.render(target)),
            (None, true) => f.write_str("ModelSpec(incomplete: no target, no features)"),
            (None, false) => f.write_str("ModelSpec(incomplete: no target)"),
            (Some(_), true) => f.write_str("ModelSpec(incomplete: no features)"),
        }
    }
}

impl Resolution {
    /// Returns the full matrices, or `None` for a split result.
    pub fn full(self) -> Option<DesignMatrices> {
        match self {
            Self::Full(design) => Some(design),
            Self::Split(_) => None,
        }
    }

    /// Returns the split, or `None` for a full result.
    pub fn split(self) -> Option<TrainValidationSplit> {
        match self {
            Self::Split(split) => Some(split),
            Self::Full(_) => None,
        }
    }
}
