//! Sequence executor
//!
//! One attempt walks the interactions as a state machine. State `n` (one
//! past the last step) is success; the `fail` target aborts.
//!
//! ```text
//!            ┌────────── outcome → interaction_map ──────────┐
//!            ▼                                               │
//! index ─▶ cancelled? ─▶ budget left? ─▶ script │ exchange ──┴─▶ index + 1
//!              │              │                      │
//!              ▼              ▼                      ▼
//!          Cancelled    RetryExhausted     UnmatchedResponse (step retry)
//! ```
//!
//! Around the attempts sit the `use` dependencies, run concurrently first,
//! and the sequence-level attempt loop.

use crate::compiler::{compile, CompiledSequence, Interaction, ResponseCandidate, SequenceStep, Target};
use crate::config::SequenceConfiguration;
use crate::context::FlowContext;
use crate::document::parse_document;
use crate::error::{FlowError, Mismatch, Result};
use crate::flow::{Flow, FlowResult};
use courier_expr::{Bindings, Program};
use courier_http::{HttpsRequestObject, HttpsResponseObject, RequestTemplate};
use courier_schema::{Encoding, Renderer};
use futures::future::try_join_all;
use uuid::Uuid;

/// Flow running a compiled request/response/script sequence
#[derive(Debug, Clone)]
pub struct HttpsSequenceFlow {
    name: String,
    sequence: CompiledSequence,
}

/// Where the state machine goes after a step
enum Next {
    Step(usize),
    End(Option<String>),
}

fn merge_into(target: &mut Bindings, values: &Bindings) {
    target.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
}

impl HttpsSequenceFlow {
    /// Flow over an already compiled sequence
    #[must_use]
    pub fn new(name: impl Into<String>, sequence: CompiledSequence) -> Self {
        Self {
            name: name.into(),
            sequence,
        }
    }

    /// Compile `steps` into a flow
    ///
    /// # Errors
    /// Returns [`FlowError::Parse`] for malformed steps.
    pub fn from_steps(
        name: impl Into<String>,
        steps: &[SequenceStep],
        configuration: SequenceConfiguration,
        encoding: Encoding,
    ) -> Result<Self> {
        Ok(Self::new(name, compile(steps, configuration, encoding)?))
    }

    /// Parse and compile a flow document
    ///
    /// # Errors
    /// Returns [`FlowError::Parse`] for a malformed document.
    pub fn from_document(name: impl Into<String>, text: &str, encoding: Encoding) -> Result<Self> {
        let (configuration, steps) = parse_document(text)?;
        Self::from_steps(name, &steps, configuration, encoding)
    }

    /// Compiled sequence
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> &CompiledSequence {
        &self.sequence
    }

    /// Run the `use` dependencies whose outputs are missing
    ///
    /// Later declarations win on conflicting keys.
    async fn run_uses(&self, values: Bindings, ctx: &FlowContext) -> Result<(Bindings, FlowContext)> {
        let pending: Vec<_> = self
            .sequence
            .configuration
            .uses
            .iter()
            .filter(|u| !u.satisfied_by(&values))
            .collect();
        if pending.is_empty() {
            return Ok((values, ctx.clone()));
        }

        let registry = ctx.runtime().registry();
        let runs = pending.iter().map(|declared| {
            let mut input = values.clone();
            merge_into(&mut input, &declared.values);
            let ctx = ctx.clone();
            async move {
                let flow = registry.get(&declared.flow)?;
                tracing::debug!(flow = %declared.flow, "running dependency");
                flow.run(input, ctx).await
            }
        });
        let results = try_join_all(runs).await?;

        let mut values = values;
        let mut produced = Bindings::new();
        for result in &results {
            merge_into(&mut produced, &result.values);
        }
        merge_into(&mut values, &produced);
        Ok((values, ctx.extended(&produced)))
    }

    async fn attempt(&self, values: Bindings, ctx: &FlowContext, renderer: &Renderer) -> Result<FlowResult> {
        let sequence = &self.sequence;
        let limit = ctx.runtime().config().max_transitions;
        let count = sequence.interactions.len();
        let mut env = values;
        let mut visits = vec![0u32; count];
        let mut transitions = 0usize;
        let mut index = 0usize;

        while index < count {
            ctx.cancellation().check()?;
            transitions += 1;
            if transitions > limit {
                return Err(FlowError::TransitionLimit(limit));
            }
            visits[index] += 1;
            let step = sequence.label(index);
            if let Some(budget) = sequence.tries[index] {
                if visits[index] > budget + 1 {
                    return Err(FlowError::RetryExhausted {
                        step,
                        visits: visits[index] - 1,
                    });
                }
            }
            tracing::debug!(step = %step, index, visit = visits[index], "entering step");

            let outcome = match &sequence.interactions[index] {
                Interaction::Script { program, .. } => {
                    self.script(program, &step, &mut env, ctx)?;
                    None
                }
                Interaction::Exchange { request, responses, .. } => {
                    match self.exchange(request, responses, &step, &env, ctx, renderer).await {
                        Ok((values, outcome)) => {
                            env = values;
                            outcome
                        }
                        Err(e) if matches!(e, FlowError::Dispatch { .. } | FlowError::UnmatchedResponse { .. }) => {
                            match sequence.tries[index] {
                                Some(budget) if visits[index] <= budget => {
                                    tracing::warn!(step = %step, error = %e, "retrying step");
                                    continue;
                                }
                                Some(_) => {
                                    tracing::warn!(step = %step, error = %e, "step out of retries");
                                    return Err(FlowError::RetryExhausted {
                                        step,
                                        visits: visits[index],
                                    });
                                }
                                None => return Err(e),
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            match self.follow(index, outcome.as_ref(), &step, ctx).await? {
                Next::Step(next) => index = next,
                Next::End(outcome) => {
                    return Ok(FlowResult { values: env, outcome });
                }
            }
        }

        Ok(FlowResult::with_values(env))
    }

    fn script(&self, program: &Program, step: &str, env: &mut Bindings, ctx: &FlowContext) -> Result<()> {
        let assigned = ctx
            .runtime()
            .evaluator()
            .execute(program, env)
            .map_err(|e| FlowError::Script {
                step: step.to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(step, assigned = assigned.len(), "script ran");
        merge_into(env, &assigned);
        Ok(())
    }

    /// Render, dispatch and match one exchange
    ///
    /// Returns the environment extended by the request and response values
    /// and the matched outcome.
    async fn exchange(
        &self,
        request: &RequestTemplate,
        responses: &[ResponseCandidate],
        step: &str,
        env: &Bindings,
        ctx: &FlowContext,
        renderer: &Renderer,
    ) -> Result<(Bindings, Option<crate::outcome::Outcome>)> {
        let rendered = request.render(renderer, env).await.map_err(|source| FlowError::Render {
            step: step.to_string(),
            source,
        })?;
        let response = self.dispatch(&rendered.request, step, ctx).await?;

        let mut sent = env.clone();
        merge_into(&mut sent, &rendered.values);
        if responses.is_empty() {
            return Ok((sent, None));
        }

        let mut mismatches = Vec::new();
        for (candidate, expected) in responses.iter().enumerate() {
            let result = expected.template.match_response(&response, renderer, &sent).await;
            if result.matched {
                tracing::debug!(step, candidate, "response matched");
                merge_into(&mut sent, &result.values);
                return Ok((sent, expected.outcome.clone()));
            }
            mismatches.push(Mismatch {
                candidate,
                diagnostics: result.diagnostics,
                preview: result.preview,
            });
        }

        tracing::warn!(step, status = response.status, candidates = mismatches.len(), "unmatched response");
        Err(FlowError::UnmatchedResponse {
            step: step.to_string(),
            status: response.status,
            mismatches,
        })
    }

    async fn dispatch(&self, request: &HttpsRequestObject, step: &str, ctx: &FlowContext) -> Result<HttpsResponseObject> {
        tracing::debug!(step, method = %request.method, url = %request.url, "dispatching");
        ctx.runtime()
            .dispatcher()
            .dispatch(request)
            .await
            .map_err(|source| FlowError::Dispatch {
                step: step.to_string(),
                source,
            })
    }

    /// Resolve the state after step `index`
    async fn follow(
        &self,
        index: usize,
        outcome: Option<&crate::outcome::Outcome>,
        step: &str,
        ctx: &FlowContext,
    ) -> Result<Next> {
        let Some(outcome) = outcome else {
            return Ok(Next::Step(index + 1));
        };
        if let Some(delay) = outcome.delay {
            tracing::debug!(step, ?delay, "waiting before next step");
            ctx.cancellation().sleep(delay).await?;
        }
        if outcome.name.is_empty() {
            return Ok(Next::Step(index + 1));
        }
        match self.sequence.interaction_map.get(&outcome.name) {
            Some(Target::Step(next)) => {
                tracing::debug!(step, outcome = %outcome.name, next, "branching");
                Ok(Next::Step(*next))
            }
            Some(Target::Fail) => Err(FlowError::Failed { step: step.to_string() }),
            None => {
                tracing::debug!(step, outcome = %outcome.name, "sequence ended by outcome");
                Ok(Next::End(Some(outcome.name.clone())))
            }
        }
    }
}

#[async_trait::async_trait]
impl Flow for HttpsSequenceFlow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, values: Bindings, ctx: FlowContext) -> Result<FlowResult> {
        let run_id = Uuid::new_v4();
        tracing::info!(flow = %self.name, %run_id, "flow started");

        let mut input = ctx.environment().clone();
        merge_into(&mut input, &values);
        for (name, value) in &self.sequence.configuration.defaults {
            input.entry(name.clone()).or_insert_with(|| value.clone());
        }

        let (input, ctx) = self.run_uses(input, &ctx).await?;
        let renderer = ctx.runtime().renderer();
        let attempts = self.sequence.configuration.attempts();
        let mut attempt = 1;
        loop {
            match self.attempt(input.clone(), &ctx, &renderer).await {
                Ok(result) => {
                    tracing::info!(
                        flow = %self.name,
                        %run_id,
                        attempt,
                        outcome = result.outcome.as_deref().unwrap_or(""),
                        "flow finished"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(flow = %self.name, %run_id, attempt, error = %e, "attempt failed, restarting");
                    attempt += 1;
                }
                Err(e) => {
                    tracing::info!(flow = %self.name, %run_id, attempt, error = %e, "flow failed");
                    return Err(e);
                }
            }
        }
    }
}
