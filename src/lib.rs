#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]
//! A per-exchange request/response context for HTTP handlers.
//!
//! A router resolves a route, then builds one [`Context`] per exchange from
//! the server's [`Transport`], the route's path bindings and a shared
//! [`Capabilities`] table. Handlers use it to read the request, build the
//! response, hand the exchange off to asynchronous work and signal that the
//! next matching handler should run.
//!
//! # Features
//!
//! - **Request view** - path parameters and splats, query and form values,
//!   the body as bytes, text or a typed object, headers, cookies, attributes
//!   and request-line metadata
//! - **Response builder** - chained setters for status, headers, content type,
//!   text or streamed bodies, cookies, JSON, templates and redirects
//! - **Async bridge** - [`Context::defer`] keeps the exchange open until the
//!   deferred work settles, writes its reply into the response, then completes
//!   the exchange before reporting any failure
//! - **Control flag** - [`Context::next`] / [`Context::nexted`]
//!
//! # Optional Features
//!
//! - `json` - [`JsonSerializer`], a `serde_json` backed [`Serializer`] (enabled by default)
//! - `cookie` - cookie parsing and `Set-Cookie` helpers via the `cookie` crate (enabled by default)
//!
//! # Examples
//!
//! ## Handling an exchange
//!
//! ```rust
//! # #[cfg(feature = "json")]
//! # {
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use http_context::{Capabilities, Context, ContextError, HttpExchange, Request, StatusCode, Transport};
//!
//! # async fn example() -> Result<(), ContextError> {
//! let request = http::Request::post("/users/7?verbose=1")
//!     .header("content-type", "application/json")
//!     .body(r#"{"name":"ada"}"#.into())
//!     .unwrap();
//! let mut exchange = HttpExchange::new(request);
//! let params = HashMap::from([(":id".to_owned(), "7".to_owned())]);
//! let mut ctx = Context::new(&mut exchange, params, Vec::new(), Arc::new(Capabilities::json()));
//!
//! let user: serde_json::Value = ctx.body_as_object().await?;
//! let reply = serde_json::json!({
//!     "id": ctx.param("id"),
//!     "name": user["name"],
//!     "verbose": ctx.query_param("verbose").is_some(),
//! });
//! ctx.set_status(StatusCode::CREATED)?.json(&reply)?;
//! ctx.finish()?;
//!
//! assert_eq!(exchange.response().status(), StatusCode::CREATED);
//! # Ok(())
//! # }
//! # }
//! ```
//!
//! ## Deferring completion
//!
//! ```rust
//! use http_context::{BoxError, Capabilities, Context, HttpExchange, Request, Transport};
//!
//! # async fn example() -> Result<(), http_context::ContextError> {
//! let mut exchange = HttpExchange::new(Request::default());
//! let mut ctx = Context::new(&mut exchange, Default::default(), Vec::new(), Capabilities::shared());
//!
//! let work = ctx.defer(|| async { Ok::<_, BoxError>("done") })?;
//! work.await?;
//! drop(ctx);
//! assert_eq!(exchange.completions(), 1);
//! assert_eq!(exchange.response().body().len(), Some(4));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, HttpError, Result, ResultExt};

mod body;
pub use body::Body;
pub use body::Error as BodyError;

mod attributes;
pub use attributes::Attributes;

pub mod capability;
#[cfg(feature = "json")]
pub use capability::JsonSerializer;
pub use capability::{
    Capabilities, CapabilitiesBuilder, Capability, EngineKind, Serializer, TemplateEngine,
};

mod charset;

mod context;
pub use context::{Context, ContextError};

mod deferred;
pub use deferred::{AsyncState, Completion, Deferred, Reply};

pub mod params;

mod transport;
pub use transport::{HttpExchange, Transport};

pub mod utils;

/// A boxed error that can cross threads.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// A type alias for HTTP requests with a custom `Body` type.
pub type Request = http::Request<Body>;
/// A type alias for HTTP responses with a custom `Body` type.
pub type Response = http::Response<Body>;

#[cfg(feature = "cookie")]
pub use cookie;

pub use http::{header, method, uri, version, Extensions, HeaderMap, Method, StatusCode, Uri, Version};
