//! Evaluation of a parsed formula against a table into numeric design matrices.
//!
//! Categorical columns are treatment coded against their first (sorted) level. In a
//! model without an intercept the first categorical term keeps every level so the
//! design still spans the constant. Columns come out as the intercept, then
//! categorical terms, then numeric terms. Rows where the target or any term is
//! missing are dropped and the surviving original row indices are kept in
//! [`DesignMatrices::row_ids`].

use std::collections::{BTreeSet, HashMap};

use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::ResolutionError;
use crate::formula::{self, ParsedFormula};
use crate::formulation::{Arg, Term};
use crate::registry::FunctionRegistry;
use crate::table::{ColumnValues, Table};

/// Name of the constant column added when the model has an intercept.
pub const INTERCEPT_NAME: &str = "Intercept";

/// Feature matrix and target vector with row-aligned metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DesignMatrices {
    features: DMatrix<f64>,
    target: DVector<f64>,
    feature_names: Vec<String>,
    target_name: String,
    row_ids: Vec<usize>,
}

impl DesignMatrices {
    /// Assembles design matrices after checking that all parts agree in shape.
    pub fn new(
        features: DMatrix<f64>,
        target: DVector<f64>,
        feature_names: Vec<String>,
        target_name: impl Into<String>,
        row_ids: Vec<usize>,
    ) -> Result<Self, ResolutionError> {
        let n = features.nrows();
        if target.len() != n {
            return Err(ResolutionError::dimension_mismatch(
                "target length",
                n,
                target.len(),
            ));
        }
        if feature_names.len() != features.ncols() {
            return Err(ResolutionError::dimension_mismatch(
                "feature names",
                features.ncols(),
                feature_names.len(),
            ));
        }
        if row_ids.len() != n {
            return Err(ResolutionError::dimension_mismatch(
                "row ids",
                n,
                row_ids.len(),
            ));
        }

        Ok(Self {
            features,
            target,
            feature_names,
            target_name: target_name.into(),
            row_ids,
        })
    }

    /// Feature matrix, one row per observation.
    pub fn features(&self) -> &DMatrix<f64> {
        &self.features
    }

    pub fn target(&self) -> &DVector<f64> {
        &self.target
    }

    /// Names of the feature columns, in column order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Index into the source table of every row.
    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    pub fn nrows(&self) -> usize {
        self.features.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.features.ncols()
    }

    /// Looks up a feature column by name.
    pub fn feature(&self, name: &str) -> Option<DVector<f64>> {
        let index = self.feature_names.iter().position(|n| n == name)?;
        Some(self.features.column(index).into_owned())
    }

    /// Splits into `(features, target)`.
    pub fn into_parts(self) -> (DMatrix<f64>, DVector<f64>) {
        (self.features, self.target)
    }

    /// Keeps the given rows (by position) in the given order.
    pub(crate) fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            features: self.features.select_rows(rows),
            target: self.target.select_rows(rows),
            feature_names: self.feature_names.clone(),
            target_name: self.target_name.clone(),
            row_ids: rows.iter().map(|&row| self.row_ids[row]).collect(),
        }
    }
}

/// Evaluated values of one term before encoding.
#[derive(Debug)]
enum Factor {
    Numeric(Vec<f64>),
    Categorical {
        levels: Vec<String>,
        codes: Vec<Option<usize>>,
    },
}

impl Factor {
    fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Numeric(values) => values[row].is_nan(),
            Self::Categorical { codes, .. } => codes[row].is_none(),
        }
    }
}

/// Parses `formula` and evaluates it against `table`.
pub fn evaluate(
    formula: &str,
    table: &Table,
    registry: &FunctionRegistry,
) -> Result<DesignMatrices, ResolutionError> {
    let parsed = formula::parse(formula)?;
    evaluate_parsed(&parsed, table, registry)
}

/// Evaluates an already parsed formula against `table`.
pub fn evaluate_parsed(
    parsed: &ParsedFormula,
    table: &Table,
    registry: &FunctionRegistry,
) -> Result<DesignMatrices, ResolutionError> {
    let target = match evaluate_term(&parsed.target, table, registry)? {
        Factor::Numeric(values) => values,
        Factor::Categorical { .. } => {
            return Err(ResolutionError::NonNumericColumn {
                name: parsed.target.to_string(),
                context: "the target",
            })
        }
    };

    // Evaluated in parallel, but the first failing term in formula order is reported.
    let factors = parsed
        .terms
        .par_iter()
        .map(|term| evaluate_term(term, table, registry))
        .collect::<Vec<_>>()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    let n = table.nrows();
    let row_ids: Vec<usize> = (0..n)
        .filter(|&row| !target[row].is_nan() && factors.iter().all(|f| !f.is_missing(row)))
        .collect();

    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();
    if parsed.intercept {
        names.push(INTERCEPT_NAME.to_string());
        columns.push(vec![1.0; n]);
    }

    let mut full_rank_pending = !parsed.intercept;
    for (term, factor) in parsed.terms.iter().zip(&factors) {
        if let Factor::Categorical { levels, codes } = factor {
            let full_rank = std::mem::take(&mut full_rank_pending);
            let skip = usize::from(!full_rank);
            for (level_index, level) in levels.iter().enumerate().skip(skip) {
                names.push(if full_rank {
                    format!("{term}[{level}]")
                } else {
                    format!("{term}[T.{level}]")
                });
                columns.push(
                    codes
                        .iter()
                        .map(|code| match code {
                            Some(code) if *code == level_index => 1.0,
                            Some(_) => 0.0,
                            None => f64::NAN,
                        })
                        .collect(),
                );
            }
        }
    }
    for (term, factor) in parsed.terms.iter().zip(factors) {
        if let Factor::Numeric(values) = factor {
            names.push(term.to_string());
            columns.push(values);
        }
    }

    let features = DMatrix::from_fn(row_ids.len(), columns.len(), |row, col| {
        columns[col][row_ids[row]]
    });
    let target = DVector::from_iterator(row_ids.len(), row_ids.iter().map(|&row| target[row]));

    let dropped = n - row_ids.len();
    if dropped > 0 {
        debug!("dropped {dropped} of {n} rows with missing values");
    }

    DesignMatrices::new(features, target, names, parsed.target.to_string(), row_ids)
}

fn numeric_column<'t>(
    table: &'t Table,
    name: &str,
    context: &'static str,
) -> Result<&'t [f64], ResolutionError> {
    let column = table
        .column(name)
        .ok_or_else(|| ResolutionError::unknown_column(name))?;
    column.as_numeric().ok_or_else(|| ResolutionError::NonNumericColumn {
        name: name.to_string(),
        context,
    })
}

fn evaluate_term(
    term: &Term,
    table: &Table,
    registry: &FunctionRegistry,
) -> Result<Factor, ResolutionError> {
    match term {
        Term::Column { name } => {
            let column = table
                .column(name)
                .ok_or_else(|| ResolutionError::unknown_column(name.as_str()))?;
            Ok(match column.values() {
                ColumnValues::Numeric(values) => Factor::Numeric(values.clone()),
                ColumnValues::Categorical(values) => encode_levels(values),
            })
        }
        Term::Call {
            function,
            column,
            args,
        } => {
            let transform = registry
                .get(function)
                .ok_or_else(|| ResolutionError::UnknownFunction {
                    name: function.clone(),
                })?;

            enum Input<'t> {
                Column(&'t [f64]),
                Value(f64),
            }
            let mut inputs = vec![Input::Column(numeric_column(
                table,
                column,
                "a function argument",
            )?)];
            for arg in args {
                inputs.push(match arg {
                    Arg::Column(name) => {
                        Input::Column(numeric_column(table, name, "a function argument")?)
                    }
                    Arg::Value(value) => Input::Value(*value),
                });
            }

            let mut row_args = vec![0.0; inputs.len()];
            let values = (0..table.nrows())
                .map(|row| {
                    for (slot, input) in row_args.iter_mut().zip(&inputs) {
                        *slot = match input {
                            Input::Column(values) => values[row],
                            Input::Value(value) => *value,
                        };
                    }
                    transform.call(&row_args)
                })
                .collect();
            Ok(Factor::Numeric(values))
        }
    }
}

fn encode_levels(values: &[Option<String>]) -> Factor {
    let levels: Vec<String> = values
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: HashMap<&str, usize> = levels
        .iter()
        .enumerate()
        .map(|(i, level)| (level.as_str(), i))
        .collect();
    let codes = values
        .iter()
        .map(|value| value.as_deref().map(|level| index[level]))
        .collect();
    Factor::Categorical { levels, codes }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::registry::Transform;
    use crate::table::{Column, TableBuilder};

    fn bikes() -> Table {
        TableBuilder::new()
            .numeric("temp", vec![10.0, 20.0, 30.0, 40.0])
            .categorical("season", vec!["winter", "spring", "winter", "summer"])
            .numeric("count", vec![5.0, 15.0, 25.0, 35.0])
            .build()
            .unwrap()
    }

    #[test]
    fn numeric_and_function_terms() {
        let mut registry = FunctionRegistry::new();
        registry.register(Transform::new("power", |args| args[0].powf(args[1])));

        let design = evaluate("count ~ -1 + temp + power(temp, 2)", &bikes(), &registry)
            .expect("resolvable formula");

        assert_eq!(design.feature_names(), ["temp", "power(temp, 2)"]);
        assert_eq!(design.target_name(), "count");
        assert_relative_eq!(
            design.feature("power(temp, 2)").unwrap(),
            DVector::from_vec(vec![100.0, 400.0, 900.0, 1600.0])
        );
        assert_eq!(design.row_ids(), [0, 1, 2, 3]);
    }

    #[test]
    fn categorical_terms_are_treatment_coded() {
        let registry = FunctionRegistry::new();

        let with_intercept = evaluate("count ~ 1 + temp + season", &bikes(), &registry).unwrap();
        assert_eq!(
            with_intercept.feature_names(),
            ["Intercept", "season[T.summer]", "season[T.winter]", "temp"]
        );
        assert_eq!(
            with_intercept.features().row(0).iter().copied().collect::<Vec<_>>(),
            vec![1.0, 0.0, 1.0, 10.0]
        );

        let without_intercept = evaluate("count ~ -1 + season", &bikes(), &registry).unwrap();
        assert_eq!(
            without_intercept.feature_names(),
            ["season[spring]", "season[summer]", "season[winter]"]
        );
        let row_sums: Vec<f64> = without_intercept
            .features()
            .row_iter()
            .map(|row| row.sum())
            .collect();
        assert_eq!(row_sums, vec![1.0; 4]);
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let table = bikes()
            .with_column(Column::numeric("temp", vec![10.0, f64::NAN, 30.0, 40.0]))
            .unwrap()
            .with_column(Column::categorical(
                "season",
                vec![Some("winter"), Some("spring"), None, Some("summer")],
            ))
            .unwrap();
        let mut registry = FunctionRegistry::new();
        registry.register(Transform::new("inverse_gap", |args| {
            if args[0] == 40.0 {
                f64::NAN
            } else {
                1.0 / (40.0 - args[0])
            }
        }));

        let design = evaluate(
            "count ~ temp + season + inverse_gap(temp)",
            &table,
            &registry,
        )
        .unwrap();
        assert_eq!(design.row_ids(), [0]);
        assert_eq!(design.target().as_slice(), [5.0]);
    }

    #[test]
    fn resolution_errors_name_the_culprit() {
        let registry = FunctionRegistry::new();
        let table = bikes();

        assert_eq!(
            evaluate("count ~ humidity", &table, &registry).unwrap_err(),
            ResolutionError::unknown_column("humidity")
        );
        assert_eq!(
            evaluate("count ~ log(temp)", &table, &registry).unwrap_err(),
            ResolutionError::UnknownFunction { name: "log".into() }
        );
        assert!(matches!(
            evaluate("season ~ temp", &table, &registry),
            Err(ResolutionError::NonNumericColumn { context: "the target", .. })
        ));

        let mut registry = FunctionRegistry::new();
        registry.register(Transform::new("scale", |args| args[0] * args[1]));
        assert!(matches!(
            evaluate("count ~ scale(temp, season)", &table, &registry),
            Err(ResolutionError::NonNumericColumn { .. })
        ));
    }

    #[test]
    fn first_failing_term_is_reported() {
        let registry = FunctionRegistry::new();
        let err = evaluate("count ~ a + b + c", &bikes(), &registry).unwrap_err();
        assert_eq!(err, ResolutionError::unknown_column("a"));
    }

    #[test]
    fn constructor_rejects_misaligned_parts() {
        let result = DesignMatrices::new(
            DMatrix::zeros(3, 1),
            DVector::zeros(2),
            vec!["x".into()],
            "y",
            vec![0, 1, 2],
        );
        assert!(matches!(
            result,
            Err(ResolutionError::DimensionMismatch { expected: 3, found: 2, .. })
        ));
    }
}
