//! Series transforms addressable by name from target expressions.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::Series;
use crate::partition::floor_to;

/// A resolved function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FuncArg {
    SeriesList(Vec<Series>),
    Number(f64),
    String(String),
    Bool(bool),
}

impl FuncArg {
    fn kind(&self) -> &'static str {
        match self {
            FuncArg::SeriesList(_) => "series list",
            FuncArg::Number(_) => "number",
            FuncArg::String(_) => "string",
            FuncArg::Bool(_) => "bool",
        }
    }
}

/// A transform from resolved arguments to a new series list.
pub trait SeriesFunction: Send + Sync {
    fn apply(&self, args: Vec<FuncArg>) -> Result<Vec<Series>>;
}

impl<F> SeriesFunction for F
where
    F: Fn(Vec<FuncArg>) -> Result<Vec<Series>> + Send + Sync,
{
    fn apply(&self, args: Vec<FuncArg>) -> Result<Vec<Series>> {
        self(args)
    }
}

/// Name to transform lookup, populated once at startup.
pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn SeriesFunction>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, function: impl SeriesFunction + 'static) {
        self.functions.insert(name.into(), Box::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&dyn SeriesFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    /// Registered function names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionRegistry {
    /// A registry holding every built-in function.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("alias", alias);
        registry.register("aliasByNode", alias_by_node);
        registry.register("group", group);
        registry.register("offset", offset);
        registry.register("scale", scale);
        registry.register("sumSeries", |args: Vec<FuncArg>| {
            aggregate("sumSeries", args, sum)
        });
        registry.register("averageSeries", |args: Vec<FuncArg>| {
            aggregate("averageSeries", args, average)
        });
        registry.register("minSeries", |args: Vec<FuncArg>| {
            aggregate("minSeries", args, min)
        });
        registry.register("maxSeries", |args: Vec<FuncArg>| {
            aggregate("maxSeries", args, max)
        });
        registry
    }
}

// ---- argument helpers ----

fn check_arity(function: &str, args: &[FuncArg], min: usize, max: Option<usize>) -> Result<()> {
    let n = args.len();
    if n < min || max.is_some_and(|max| n > max) {
        let expected = match max {
            Some(max) if max == min => format!("{}", min),
            Some(max) => format!("{} to {}", min, max),
            None => format!("at least {}", min),
        };
        return Err(Error::Argument(format!(
            "{} expects {} arguments, got {}",
            function, expected, n
        )));
    }
    Ok(())
}

fn type_error(function: &str, position: usize, expected: &str, got: &FuncArg) -> Error {
    Error::Argument(format!(
        "{} argument {} must be a {}, got {}",
        function,
        position + 1,
        expected,
        got.kind()
    ))
}

fn series_list(function: &str, position: usize, arg: FuncArg) -> Result<Vec<Series>> {
    match arg {
        FuncArg::SeriesList(series) => Ok(series),
        other => Err(type_error(function, position, "series list", &other)),
    }
}

fn number(function: &str, position: usize, arg: &FuncArg) -> Result<f64> {
    match arg {
        FuncArg::Number(n) => Ok(*n),
        other => Err(type_error(function, position, "number", other)),
    }
}

/// Concatenates every argument, which must all be series lists.
fn all_series(function: &str, args: Vec<FuncArg>) -> Result<Vec<Series>> {
    check_arity(function, &args, 1, None)?;
    let mut out = Vec::new();
    for (i, arg) in args.into_iter().enumerate() {
        out.extend(series_list(function, i, arg)?);
    }
    Ok(out)
}

/// Splits `(seriesList, rest...)`.
fn split_head(function: &str, mut args: Vec<FuncArg>) -> Result<(Vec<Series>, Vec<FuncArg>)> {
    let rest = args.split_off(1);
    let head = args
        .pop()
        .ok_or_else(|| Error::Argument(format!("{} requires a series list", function)))?;
    Ok((series_list(function, 0, head)?, rest))
}

// ---- naming ----

fn format_number(n: f64) -> String {
    format!("{}", n)
}

/// The metric path inside a possibly function-wrapped name.
fn metric_path(name: &str) -> &str {
    let inner = match name.rfind('(') {
        Some(i) => &name[i + 1..],
        None => name,
    };
    inner.split([',', ')']).next().unwrap_or(inner)
}

// ---- transforms ----

fn alias(args: Vec<FuncArg>) -> Result<Vec<Series>> {
    check_arity("alias", &args, 2, Some(2))?;
    let (series, rest) = split_head("alias", args)?;
    let name = match &rest[0] {
        FuncArg::String(s) => s.clone(),
        other => return Err(type_error("alias", 1, "string", other)),
    };
    Ok(series
        .into_iter()
        .map(|s| s.with_alias(name.clone()))
        .collect())
}

fn alias_by_node(args: Vec<FuncArg>) -> Result<Vec<Series>> {
    check_arity("aliasByNode", &args, 2, None)?;
    let (series, rest) = split_head("aliasByNode", args)?;
    let nodes = rest
        .iter()
        .enumerate()
        .map(|(i, arg)| number("aliasByNode", i + 1, arg).map(|n| n as i64))
        .collect::<Result<Vec<_>>>()?;

    series
        .into_iter()
        .map(|s| {
            let parts: Vec<&str> = metric_path(s.name()).split('.').collect();
            let picked = nodes
                .iter()
                .map(|&node| {
                    let idx = if node < 0 {
                        parts.len() as i64 + node
                    } else {
                        node
                    };
                    usize::try_from(idx)
                        .ok()
                        .and_then(|idx| parts.get(idx).copied())
                        .ok_or_else(|| {
                            Error::Argument(format!(
                                "aliasByNode: node {} out of range for '{}'",
                                node,
                                s.name()
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let alias = picked.join(".");
            Ok(s.with_alias(alias))
        })
        .collect()
}

fn group(args: Vec<FuncArg>) -> Result<Vec<Series>> {
    all_series("group", args)
}

fn map_values<F>(function: &str, args: Vec<FuncArg>, op: F) -> Result<Vec<Series>>
where
    F: Fn(f64, f64) -> f64,
{
    check_arity(function, &args, 2, Some(2))?;
    let (series, rest) = split_head(function, args)?;
    let factor = number(function, 1, &rest[0])?;
    Ok(series
        .into_iter()
        .map(|s| {
            let values = s.values().iter().map(|v| v.map(|v| op(v, factor))).collect();
            let name = format!("{}({},{})", function, s.alias(), format_number(factor));
            Series::with_values(name, values, s.start(), s.step())
        })
        .collect())
}

fn offset(args: Vec<FuncArg>) -> Result<Vec<Series>> {
    map_values("offset", args, |v, factor| v + factor)
}

fn scale(args: Vec<FuncArg>) -> Result<Vec<Series>> {
    map_values("scale", args, |v, factor| v * factor)
}

// ---- aggregation ----

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b) * b).abs()
}

/// Resamples every series onto one grid whose step is the least common
/// multiple of the input steps. Each output slot holds the average of the
/// defined input points falling in it, or `None`.
fn normalize(series: &[Series]) -> (i64, i64, Vec<Vec<Option<f64>>>) {
    let step = series.iter().map(Series::step).fold(1, lcm).max(1);
    let non_empty = || series.iter().filter(|s| !s.is_empty());
    let Some(first) = non_empty().map(Series::start).min() else {
        let start = series.iter().map(Series::start).min().unwrap_or(0);
        return (floor_to(start, step), step, vec![Vec::new(); series.len()]);
    };
    let start = floor_to(first, step);
    let last = non_empty().map(Series::end).max().unwrap_or(first);
    let slots = ((last - start) / step + 1) as usize;

    let columns = series
        .iter()
        .map(|s| {
            let mut buckets = vec![(0.0, 0usize); slots];
            for point in s.points() {
                let Some(value) = point.value else { continue };
                let slot = ((point.timestamp - start) / step) as usize;
                if let Some(bucket) = buckets.get_mut(slot) {
                    bucket.0 += value;
                    bucket.1 += 1;
                }
            }
            buckets
                .into_iter()
                .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
                .collect()
        })
        .collect();

    (start, step, columns)
}

fn aggregate(function: &str, args: Vec<FuncArg>, combine: fn(&[f64]) -> f64) -> Result<Vec<Series>> {
    let series = all_series(function, args)?;
    if series.is_empty() {
        return Ok(Vec::new());
    }

    let (start, step, columns) = normalize(&series);
    let slots = columns.first().map_or(0, Vec::len);
    let mut values = Vec::with_capacity(slots);
    let mut row = Vec::with_capacity(columns.len());
    for slot in 0..slots {
        row.clear();
        row.extend(columns.iter().filter_map(|column| column[slot]));
        values.push((!row.is_empty()).then(|| combine(&row)));
    }

    let names: Vec<&str> = series.iter().map(Series::alias).collect();
    let name = format!("{}({})", function, names.join(","));
    Ok(vec![Series::with_values(name, values, start, step)])
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

fn average(values: &[f64]) -> f64 {
    sum(values) / values.len() as f64
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}
