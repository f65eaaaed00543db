//! Sequence compiler
//!
//! Turns an ordered step list into interactions, a name → target map and
//! per-step retry budgets. Responses attach to the request before them.

use crate::config::SequenceConfiguration;
use crate::error::{FlowError, Result};
use crate::outcome::{parse_step_name, Outcome, FAIL};
use courier_expr::{parse_program, Program};
use courier_http::{RequestTemplate, ResponseTemplate};
use courier_schema::Encoding;
use indexmap::IndexMap;
use serde_json::Value;

/// One declared step before compilation
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceStep {
    /// Outbound request; `name` may carry `/retries`
    Request {
        /// Step name
        name: Option<String>,
        /// Raw request template
        template: Value,
    },
    /// Expected response of the preceding request
    Response {
        /// Raw response template
        template: Value,
        /// `name[+delay]` to branch to on a match
        outcome: Option<String>,
    },
    /// Inline script updating flow values
    Script {
        /// Step name; may carry `/retries`
        name: Option<String>,
        /// Script source
        source: String,
    },
}

/// Response template paired with the outcome it selects
#[derive(Debug, Clone)]
pub struct ResponseCandidate {
    /// Expected response
    pub template: ResponseTemplate,
    /// Branch taken on a match
    pub outcome: Option<Outcome>,
}

/// Compiled step
#[derive(Debug, Clone)]
pub enum Interaction {
    /// Request with its candidate responses, tried in order
    Exchange {
        /// Step name
        name: Option<String>,
        /// Outbound template
        request: RequestTemplate,
        /// Candidate responses; none accepts anything
        responses: Vec<ResponseCandidate>,
    },
    /// Inline script
    Script {
        /// Step name
        name: Option<String>,
        /// Parsed script
        program: Program,
    },
}

impl Interaction {
    /// Declared name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Exchange { name, .. } | Self::Script { name, .. } => name.as_deref(),
        }
    }
}

/// Where an outcome leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Interaction index
    Step(usize),
    /// Abort the attempt as failed
    Fail,
}

/// Compiled sequence
#[derive(Debug, Clone)]
pub struct CompiledSequence {
    /// Interactions in declaration order
    pub interactions: Vec<Interaction>,
    /// Step name to target; `fail` is always present
    pub interaction_map: IndexMap<String, Target>,
    /// Retry budget per interaction
    pub tries: Vec<Option<u32>>,
    /// Leading configuration
    pub configuration: SequenceConfiguration,
}

impl CompiledSequence {
    /// Label of step `index` for errors and logs
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.interactions
            .get(index)
            .and_then(Interaction::name)
            .map_or_else(|| format!("#{index}"), str::to_string)
    }
}

/// Compile `steps`
///
/// # Errors
/// Returns [`FlowError::Parse`] for a response without a request, a
/// duplicate or reserved step name, or a malformed template, outcome or
/// script.
pub fn compile(
    steps: &[SequenceStep],
    configuration: SequenceConfiguration,
    encoding: Encoding,
) -> Result<CompiledSequence> {
    let space = configuration.space();
    let mut interactions = Vec::new();
    let mut tries = Vec::new();
    let mut interaction_map = IndexMap::new();
    interaction_map.insert(FAIL.to_string(), Target::Fail);
    let mut open: Option<usize> = None;

    let mut name_step = |name: &Option<String>, index: usize| -> Result<(Option<String>, Option<u32>)> {
        let Some(raw) = name else {
            return Ok((None, None));
        };
        let (name, retries) = parse_step_name(raw)?;
        if interaction_map.insert(name.clone(), Target::Step(index)).is_some() {
            return Err(FlowError::Parse(format!("duplicate step name `{name}`")));
        }
        Ok((Some(name), retries))
    };

    for (position, step) in steps.iter().enumerate() {
        match step {
            SequenceStep::Request { name, template } => {
                let index = interactions.len();
                let (name, retries) = name_step(name, index)?;
                let request = RequestTemplate::parse_with(template, encoding)
                    .map_err(|e| FlowError::Parse(format!("step {position}: {e}")))?
                    .with_config(space.clone());
                interactions.push(Interaction::Exchange {
                    name,
                    request,
                    responses: Vec::new(),
                });
                tries.push(retries);
                open = Some(index);
            }
            SequenceStep::Response { template, outcome } => {
                let Some(index) = open else {
                    return Err(FlowError::Parse(format!(
                        "step {position}: response has no preceding request"
                    )));
                };
                let template = ResponseTemplate::parse_with(template, encoding)
                    .map_err(|e| FlowError::Parse(format!("step {position}: {e}")))?
                    .with_config(space.clone());
                let outcome = outcome.as_deref().map(str::parse::<Outcome>).transpose()?;
                if let Some(Interaction::Exchange { responses, .. }) = interactions.get_mut(index) {
                    responses.push(ResponseCandidate { template, outcome });
                }
            }
            SequenceStep::Script { name, source } => {
                let index = interactions.len();
                let (name, retries) = name_step(name, index)?;
                let program =
                    parse_program(source).map_err(|e| FlowError::Parse(format!("step {position}: {e}")))?;
                interactions.push(Interaction::Script { name, program });
                tries.push(retries);
                open = None;
            }
        }
    }

    tracing::debug!(
        interactions = interactions.len(),
        names = interaction_map.len() - 1,
        "sequence compiled"
    );
    Ok(CompiledSequence {
        interactions,
        interaction_map,
        tries,
        configuration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(name: &str) -> SequenceStep {
        SequenceStep::Request {
            name: Some(name.to_string()),
            template: json!("GET /"),
        }
    }

    #[test]
    fn names_and_budgets() {
        let steps = vec![
            request("a/2"),
            SequenceStep::Response {
                template: json!(200),
                outcome: Some("c+1s".into()),
            },
            SequenceStep::Script {
                name: Some("b".into()),
                source: "x = 1".into(),
            },
            request("c"),
        ];
        let compiled = compile(&steps, SequenceConfiguration::default(), Encoding::Json).unwrap();
        assert_eq!(compiled.interactions.len(), 3);
        assert_eq!(compiled.tries, vec![Some(2), None, None]);
        assert_eq!(compiled.interaction_map["a"], Target::Step(0));
        assert_eq!(compiled.interaction_map["c"], Target::Step(2));
        assert_eq!(compiled.interaction_map["fail"], Target::Fail);
        let Interaction::Exchange { responses, .. } = &compiled.interactions[0] else {
            panic!("expected exchange");
        };
        assert_eq!(responses[0].outcome.as_ref().map(|o| o.name.as_str()), Some("c"));
        assert_eq!(compiled.label(1), "b");
    }

    #[test]
    fn response_needs_request() {
        let steps = vec![SequenceStep::Response {
            template: json!(200),
            outcome: None,
        }];
        assert!(matches!(
            compile(&steps, SequenceConfiguration::default(), Encoding::Json),
            Err(FlowError::Parse(_))
        ));

        let after_script = vec![
            SequenceStep::Script {
                name: None,
                source: "x = 1".into(),
            },
            SequenceStep::Response {
                template: json!(200),
                outcome: None,
            },
        ];
        assert!(compile(&after_script, SequenceConfiguration::default(), Encoding::Json).is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        let steps = vec![request("a"), request("a")];
        assert!(compile(&steps, SequenceConfiguration::default(), Encoding::Json).is_err());
    }
}
