//! Flows and the flow registry

use crate::context::FlowContext;
use crate::error::{FlowError, Result};
use courier_expr::Bindings;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// What a finished flow hands back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowResult {
    /// Bindings after the last step
    pub values: Bindings,
    /// Outcome that ended the flow, if one did
    pub outcome: Option<String>,
}

impl FlowResult {
    /// Result carrying `values`
    #[must_use]
    pub fn with_values(values: Bindings) -> Self {
        Self { values, outcome: None }
    }
}

/// Something runnable with input values in a context
#[async_trait::async_trait]
pub trait Flow: Send + Sync + Debug {
    /// Name used in logs and `use` declarations
    fn name(&self) -> &str;

    /// Run with `values`
    async fn run(&self, values: Bindings, ctx: FlowContext) -> Result<FlowResult>;
}

type FlowFn = dyn Fn(Bindings, FlowContext) -> BoxFuture<'static, Result<FlowResult>> + Send + Sync;

/// Flow backed by a closure
pub struct FnFlow {
    name: String,
    run: Box<FlowFn>,
}

impl FnFlow {
    /// Flow named `name` running `run`
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Bindings, FlowContext) -> BoxFuture<'static, Result<FlowResult>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }
}

impl Debug for FnFlow {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFlow").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Flow for FnFlow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, values: Bindings, ctx: FlowContext) -> Result<FlowResult> {
        (self.run)(values, ctx).await
    }
}

/// Flows available to `use` declarations, by name
#[derive(Debug, Default, Clone)]
pub struct FlowRegistry {
    flows: Arc<RwLock<IndexMap<String, Arc<dyn Flow>>>>,
}

impl FlowRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `flow` under its name, replacing any previous one
    pub fn register(&self, flow: Arc<dyn Flow>) {
        let name = flow.name().to_string();
        if self.flows.write().insert(name.clone(), flow).is_some() {
            tracing::warn!(flow = %name, "flow replaced in registry");
        }
    }

    /// Flow named `name`
    ///
    /// # Errors
    /// Returns [`FlowError::UnknownFlow`] if nothing is registered under it.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Flow>> {
        self.flows
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))
    }

    /// Registered names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.flows.read().keys().cloned().collect()
    }

    /// Run `name` and thread its result into a new context
    ///
    /// The returned context's environment is `ctx`'s extended by the
    /// flow's values.
    ///
    /// # Errors
    /// Returns [`FlowError::UnknownFlow`] or the flow's own error.
    pub async fn run(&self, name: &str, values: Bindings, ctx: &FlowContext) -> Result<(FlowResult, FlowContext)> {
        let flow = self.get(name)?;
        let result = flow.run(values, ctx.clone()).await?;
        let next = ctx.extended(&result.values);
        Ok((result, next))
    }
}
