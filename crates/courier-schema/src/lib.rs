//! Courier Schema Engine
//!
//! Composable schemas built from raw templates, combined under merge
//! modes and rendered against bound values.
//!
//! # Pipeline
//!
//! ```text
//! Template ──expand──▶ Schema ──merge(mode)──▶ Schema' ──scope──▶ Scope tree
//!                                   │                                 │
//!                                   ▼                                 ▼
//!                            Diagnostics            ConfigurationSpace::narrow
//!                                                                     │
//!                                             Renderer::render ◀──────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use courier_schema::{expand, ConfigurationSpace, MergeContext, Mode, Renderer, RenderMode, Template};
//! use courier_expr::Bindings;
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let template = Template::from_value(&json!({"id": "{{id}}", "kind": "user"}));
//! let schema = expand(&template, &mut MergeContext::new(Mode::Merge)).unwrap();
//!
//! let mut inputs = Bindings::new();
//! inputs.insert("id".into(), json!(7));
//! let rendered = Renderer::new()
//!     .render(schema.as_ref(), &inputs, &ConfigurationSpace::new(), RenderMode::Render)
//!     .await
//!     .unwrap();
//! assert_eq!(rendered.value, json!({"id": 7, "kind": "user"}));
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod codec;
pub mod config;
mod context;
mod error;
pub mod redact;
pub mod render;
pub mod schema;
pub mod scope;
mod template;

pub use config::ConfigurationSpace;
pub use context::{index_segment, MergeContext, Mode, RenderMode};
pub use error::{Diagnostic, DiagnosticKind, LowerError, RenderError};
pub use redact::{MaskRedactor, Redactor};
pub use render::{RenderPass, Rendered, Renderer};
pub use schema::{
    build_scope, expand, unify, ArraySchema, EncodingSchema, KeyedListSchema, Merged, ObjectSchema,
    ReferenceSchema, ScalarSchema, Schema, SchemaRef,
};
pub use scope::{Binding, Declaration, Provenance, Scope};
pub use template::{lower, Encoding, Template};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
