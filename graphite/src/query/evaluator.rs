//! Evaluation of parsed targets into series lists.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::{Error, Result};
use crate::fanout::join_all;
use crate::model::Series;
use crate::names::split_name;
use crate::storage::Store;

use super::functions::{FuncArg, FunctionRegistry};
use super::parser::{Expr, parse};

/// Walks expression trees against a [`Store`].
///
/// Sibling arguments that need the store run as separate tasks. Every task
/// is joined before a call node returns, on success and on error, so no
/// fetch outlives the evaluation that started it.
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<dyn Store>,
    registry: Arc<FunctionRegistry>,
}

impl Evaluator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_registry(store, FunctionRegistry::default())
    }

    pub fn with_registry(store: Arc<dyn Store>, registry: FunctionRegistry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Parses and evaluates one target.
    pub async fn evaluate_target(&self, target: &str, start: i64, end: i64) -> Result<Vec<Series>> {
        let expr = parse(target)?;
        tracing::debug!(query = target, start, end, "evaluating target");
        self.evaluate(expr, start, end).await
    }

    /// Evaluates several targets concurrently.
    ///
    /// All targets are parsed before anything is fetched. Output is the
    /// concatenation of each target's series, in target order.
    pub async fn evaluate_targets(
        &self,
        targets: &[String],
        start: i64,
        end: i64,
    ) -> Result<Vec<Series>> {
        let exprs = targets
            .iter()
            .map(|t| parse(t))
            .collect::<Result<Vec<_>>>()?;
        let results = join_all(exprs.into_iter().map(|expr| {
            let this = self.clone();
            async move { this.evaluate(expr, start, end).await }
        }))
        .await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Evaluates a parsed tree. The root must produce a series list.
    pub async fn evaluate(&self, expr: Expr, start: i64, end: i64) -> Result<Vec<Series>> {
        match self.clone().eval_node(expr, start, end).await? {
            FuncArg::SeriesList(series) => Ok(series),
            other => Err(Error::Argument(format!(
                "target evaluated to a literal: {:?}",
                other
            ))),
        }
    }

    fn eval_node(self, expr: Expr, start: i64, end: i64) -> BoxFuture<'static, Result<FuncArg>> {
        async move {
            match expr {
                Expr::SeriesList(pattern) => {
                    // One fetch for the whole expansion so the store can batch it.
                    let names = split_name(&pattern).join(",");
                    let series = self.store.fetch(&names, start, end).await?;
                    Ok(FuncArg::SeriesList(series))
                }
                Expr::Number(n) => Ok(FuncArg::Number(n)),
                Expr::String(s) => Ok(FuncArg::String(s)),
                Expr::Bool(b) => Ok(FuncArg::Bool(b)),
                Expr::Call { function, args } => self.eval_call(function, args, start, end).await,
            }
        }
        .boxed()
    }

    async fn eval_call(
        self,
        function: String,
        args: Vec<Expr>,
        start: i64,
        end: i64,
    ) -> Result<FuncArg> {
        let mut resolved: Vec<Option<FuncArg>> = Vec::with_capacity(args.len());
        let mut pending = Vec::new();
        for (idx, arg) in args.into_iter().enumerate() {
            match literal(arg) {
                Ok(value) => resolved.push(Some(value)),
                Err(expr) => {
                    resolved.push(None);
                    pending.push((idx, self.clone().eval_node(expr, start, end)));
                }
            }
        }

        let (indices, futures): (Vec<usize>, Vec<_>) = pending.into_iter().unzip();
        let values = join_all(futures).await?;
        for (idx, value) in indices.into_iter().zip(values) {
            resolved[idx] = Some(value);
        }

        let func = self
            .registry
            .get(&function)
            .ok_or_else(|| Error::UnsupportedFunction(function.clone()))?;
        let series = func.apply(resolved.into_iter().flatten().collect())?;
        Ok(FuncArg::SeriesList(series))
    }
}

/// Literals resolve in place; anything else is handed back for evaluation.
fn literal(expr: Expr) -> std::result::Result<FuncArg, Expr> {
    match expr {
        Expr::Number(n) => Ok(FuncArg::Number(n)),
        Expr::String(s) => Ok(FuncArg::String(s)),
        Expr::Bool(b) => Ok(FuncArg::Bool(b)),
        other => Err(other),
    }
}
