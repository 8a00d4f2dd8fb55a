//! Named row-wise transforms that formula terms can call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

type TransformFn = dyn Fn(&[f64]) -> f64 + Send + Sync;

/// A named function evaluated once per row.
///
/// The first argument is the row's value in the term's column, followed by the
/// term's extra arguments in order.
#[derive(Clone)]
pub struct Transform {
    name: String,
    function: Arc<TransformFn>,
}

impl Transform {
    /// Wraps `function` under `name`, the name formula terms call it by.
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
        }
    }

    /// Name the transform is registered and called under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the transform to one row's arguments.
    pub fn call(&self, args: &[f64]) -> f64 {
        (self.function)(args)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Transforms available to formula resolution, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Transform>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transform` under its name; the last registration of a name wins.
    pub fn register(&mut self, transform: Transform) -> Option<Transform> {
        let previous = self
            .functions
            .insert(transform.name.clone(), transform);
        if let Some(previous) = &previous {
            debug!("transform `{}` replaced an earlier registration", previous.name);
        }
        previous
    }

    /// Looks up a transform by name.
    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.functions.get(name)
    }

    /// Whether a transform is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
