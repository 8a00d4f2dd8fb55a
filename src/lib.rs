//! Incremental construction of statistical design matrices from tabular data.
//!
//! Instead of hand-writing `"count ~ temp + square(temp)"`, a [`ModelSpec`] is built
//! up call by call, and resolved into an `nalgebra` feature matrix and target vector
//! when needed. The crate offers tools to
//!
//! - load a CSV file (or any [`TableSource`]) into a typed [`Table`] (`table` module),
//! - describe additive terms and their undo units (`formulation` module),
//! - register named row-wise [`Transform`]s for derived features (`registry` module),
//! - parse and evaluate additive formulas, including treatment coding of
//!   categorical columns (`formula` and `design` modules), and
//! - split the result into seeded train/validation partitions (`splitting` module).
//!
//! # Quick start
//!
//! ```no_run
//! use designspec::{ExtraArgs, ModelSpec, ResolveOptions, Transform};
//!
//! let mut spec = ModelSpec::from_csv("bikes.csv", false).expect("readable csv");
//! spec.add_target("count").unwrap();
//! spec.add_feature("temp").unwrap();
//! let square = Transform::new("square", |args| args[0] * args[0]);
//! spec.add_function_feature(square, "temp", ExtraArgs::None).unwrap();
//!
//! let design = spec.resolve().expect("resolvable formula");
//! println!("{} rows, features {:?}", design.nrows(), design.feature_names());
//!
//! let split = spec
//!     .resolve_with(&ResolveOptions::new().with_split(true))
//!     .expect("splittable")
//!     .split()
//!     .unwrap();
//! println!("validation rows: {}", split.validation.nrows());
//! ```

pub mod design;
pub mod error;
pub mod formula;
pub mod formulation;
pub mod model;
pub mod options;
pub mod registry;
pub mod splitting;
pub mod table;

pub use design::DesignMatrices;
pub use error::{ResolutionError, Result, SpecError, TableError};
pub use formulation::{Arg, ExtraArgs, Fragment, Term};
pub use model::{ModelSpec, Resolution};
pub use options::{ResolveOptions, SpecOptions};
pub use registry::{FunctionRegistry, Transform};
pub use splitting::{SplitOptions, TrainValidationSplit};
pub use table::{Column, ColumnValues, CsvSource, Table, TableBuilder, TableSource};
