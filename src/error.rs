use thiserror::Error;

/// Boxed error returned by caller-supplied transformations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for `designspec` operations.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Raised when the backing table cannot be read or is not rectangular.
    #[error("could not load table from `{origin}`: {source}")]
    DataSource {
        /// Human-readable identifier of the source, usually a file path.
        origin: String,
        /// Underlying reader or validation failure.
        #[source]
        source: TableError,
    },

    /// Raised when an operation needs a target before one has been set.
    #[error("no target set; call `add_target` first")]
    UnsetTarget,

    /// Raised when resolution is attempted without any feature fragments.
    #[error("no features added; call `add_feature` or `add_function_feature` first")]
    EmptyFormula,

    /// Raised when the table transformation applied before resolution fails.
    #[error("table transformation before resolution failed: {0}")]
    Preprocessing(#[source] BoxError),

    /// Raised when the matrix transformation applied after resolution fails.
    #[error("matrix transformation after resolution failed: {0}")]
    Postprocessing(#[source] BoxError),

    /// Raised when the formula cannot be turned into design matrices.
    #[error("formula resolution failed: {0}")]
    FormulaResolution(#[from] ResolutionError),

    /// Raised when a transform argument is infinite or NaN, which no formula can express.
    #[error("argument {value} of `{function}` must be a finite number")]
    NonFiniteArgument { function: String, value: f64 },

    /// Raised when a train/validation split is impossible for the data at hand.
    #[error("cannot split {rows} rows with validation fraction {fraction}")]
    InvalidSplit { rows: usize, fraction: f64 },
}

impl SpecError {
    /// Helper for wrapping table failures with the source they came from.
    pub fn data_source(origin: impl Into<String>, source: TableError) -> Self {
        Self::DataSource {
            origin: origin.into(),
            source,
        }
    }
}

/// Failures of the formula engine: parsing, name lookup and evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    /// The generated or supplied formula string is not valid.
    #[error("syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    /// A referenced column does not exist in the table.
    #[error("unknown column `{name}`")]
    UnknownColumn { name: String },

    /// A called function has not been registered.
    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },

    /// A categorical column was used where numbers are required.
    #[error("column `{name}` is categorical and cannot be used as {context}")]
    NonNumericColumn { name: String, context: &'static str },

    /// Raised when arrays have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },
}

impl ResolutionError {
    /// Helper to format a [`Syntax`](ResolutionError::Syntax) error.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Helper to format a [`DimensionMismatch`](ResolutionError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper to raise when a referenced column is not in the table.
    pub fn unknown_column(name: impl Into<String>) -> Self {
        Self::UnknownColumn { name: name.into() }
    }
}

/// Failures while reading or assembling a [`Table`](crate::table::Table).
#[derive(Debug, Error)]
pub enum TableError {
    /// The CSV reader failed, including on rows of uneven length.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// The source has a header but no columns.
    #[error("table has no columns")]
    NoColumns,

    /// A column was given an empty name.
    #[error("column {index} has an empty name")]
    EmptyColumnName { index: usize },

    /// Two columns share a name.
    #[error("column `{name}` appears more than once")]
    DuplicateColumn { name: String },

    /// Raised when a column's length disagrees with the rest of the table.
    #[error("column `{column}` has {found} rows but the table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SpecError>;
