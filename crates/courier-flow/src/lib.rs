//! Courier Flows
//!
//! Compiles request/response/script sequences and runs them as state
//! machines against a pluggable [`Dispatcher`].
//!
//! # Architecture
//!
//! ```text
//! document ──parse──▶ SequenceStep* ──compile──▶ CompiledSequence
//!                                                      │
//!                   FlowContext { environment, cancellation, runtime }
//!                                                      │
//!      use flows (concurrent) ──▶ attempt loop ──▶ step state machine
//!                                                      │
//!                          render ▶ dispatch ▶ match ▶ outcome
//! ```
//!
//! # Example
//!
//! ```rust
//! use courier_flow::{
//!     DispatchError, Dispatcher, Flow, FlowContext, FlowRuntime, HttpsSequenceFlow,
//! };
//! use courier_http::{HttpsRequestObject, HttpsResponseObject};
//! use courier_schema::Encoding;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Dispatcher for Echo {
//!     async fn dispatch(&self, request: &HttpsRequestObject) -> Result<HttpsResponseObject, DispatchError> {
//!         Ok(HttpsResponseObject::new(200).with_body(format!(r#"{{"seen": "{}"}}"#, request.url)))
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let flow = HttpsSequenceFlow::from_document(
//!     "echo",
//!     ">>>\nGET /hello\n\n<<< 200\n\n{\"seen\": \"{{seen}}\"}\n",
//!     Encoding::Json,
//! )
//! .unwrap();
//! let ctx = FlowContext::new(Arc::new(FlowRuntime::new(Arc::new(Echo))));
//! let result = flow.run(Default::default(), ctx).await.unwrap();
//! assert_eq!(result.values["seen"], json!("/hello"));
//! # });
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod compiler;
mod config;
mod context;
pub mod document;
mod error;
mod executor;
mod flow;
mod outcome;

pub use compiler::{compile, CompiledSequence, Interaction, ResponseCandidate, SequenceStep, Target};
pub use config::{EngineConfig, SequenceConfiguration, UseDeclaration};
pub use context::{CancellationHandle, CancellationSignal, Dispatcher, FlowContext, FlowRuntime};
pub use document::parse_document;
pub use error::{DispatchError, FlowError, Mismatch, Result};
pub use executor::HttpsSequenceFlow;
pub use flow::{Flow, FlowRegistry, FlowResult, FnFlow};
pub use outcome::{parse_step_name, Outcome, FAIL};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
