//! Courier HTTP Templates
//!
//! Request and response templates built from the schema engine.
//!
//! A request is `{method, origin, pathname, search, headers, body,
//! computations}`; a response is `{status, headers, body}`. Bodies pick
//! their encoding from what the template text looks like, falling back to
//! the declared `content-type` and finally to opaque text.
//!
//! # Example
//!
//! ```rust
//! use courier_http::{HttpsResponseObject, RequestTemplate, ResponseTemplate};
//! use courier_expr::Bindings;
//! use courier_schema::Renderer;
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let request = RequestTemplate::parse(&json!("GET https://{{...host}}/users/{{id}}")).unwrap();
//! let mut inputs = Bindings::new();
//! inputs.insert("host".into(), json!("api.example.com"));
//! inputs.insert("id".into(), json!(7));
//! let rendered = request.render(&Renderer::new(), &inputs).await.unwrap();
//! assert_eq!(rendered.request.url, "https://api.example.com/users/7");
//!
//! let expected = ResponseTemplate::parse(&json!({"status": "2xx", "body": "{\"name\": \"{{name}}\"}"})).unwrap();
//! let response = HttpsResponseObject::new(200).with_body(r#"{"name": "Ada"}"#);
//! let matched = expected.match_response(&response, &Renderer::new(), &inputs).await;
//! assert!(matched.matched);
//! assert_eq!(matched.values["name"], json!("Ada"));
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod address;
mod body;
mod error;
mod message;
mod object;
mod request;
mod response;
mod shape;

pub use address::{join_url, split_url, UrlParts};
pub use body::BodySchema;
pub use error::{HttpError, Result};
pub use object::{HttpsRequestObject, HttpsResponseObject};
pub use request::{RenderedRequest, RequestSchema, RequestTemplate};
pub use response::{ResponseMatch, ResponseSchema, ResponseTemplate};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
