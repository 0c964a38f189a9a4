//! Write side of [`Context`]: status, headers, body, cookies and redirects.
//!
//! Every mutator fails with [`ContextError::ExchangeCompleted`] once the
//! exchange went asynchronous and completed: the transport may already have
//! sent the response, so later writes would be lost silently.
use bytestr::ByteStr;
use http::header::{self, HeaderName, HeaderValue};
use http::StatusCode;
use mime::Mime;
use serde::Serialize;

use super::{Context, ContextError, ResponseBody};
use crate::charset::Charset;
use crate::{Body, Capability, EngineKind, Transport};

impl<T: Transport + ?Sized> Context<'_, T> {
    /// The status the response will be sent with.
    pub fn status(&self) -> StatusCode {
        self.transport.response().status()
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) -> Result<&mut Self, ContextError> {
        self.ensure_open()?;
        *self.transport.response_mut().status_mut() = status;
        Ok(self)
    }

    /// Sets a response header, replacing any earlier value under `name`.
    ///
    /// # Errors
    ///
    /// [`ContextError::InvalidHeader`] when `name` or `value` is not valid HTTP.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, ContextError> {
        self.ensure_open()?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ContextError::InvalidHeader(name.to_owned()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| ContextError::InvalidHeader(name.to_string()))?;
        self.transport.response_mut().headers_mut().insert(name, value);
        Ok(self)
    }

    /// Sets the response `Content-Type`.
    pub fn set_content_type(&mut self, value: &str) -> Result<&mut Self, ContextError> {
        self.set_header(header::CONTENT_TYPE.as_str(), value)
    }

    /// Sets a text body, discarding any streamed body.
    pub fn set_body(&mut self, text: impl Into<String>) -> Result<&mut Self, ContextError> {
        self.ensure_open()?;
        self.body = ResponseBody::Text(ByteStr::from(text.into()));
        Ok(self)
    }

    /// Sets a streamed body, discarding any text body.
    pub fn set_body_stream(&mut self, body: impl Into<Body>) -> Result<&mut Self, ContextError> {
        self.ensure_open()?;
        self.body = ResponseBody::Stream(body.into());
        Ok(self)
    }

    /// The text body, if one is set.
    pub fn response_body(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// The streamed body, if one is set.
    pub fn body_stream(&mut self) -> Option<&mut Body> {
        match &mut self.body {
            ResponseBody::Stream(body) => Some(body),
            _ => None,
        }
    }

    /// Moves the streamed body out, leaving the response without a body.
    pub fn take_body_stream(&mut self) -> Option<Body> {
        match core::mem::take(&mut self.body) {
            ResponseBody::Stream(body) => Some(body),
            other => {
                self.body = other;
                None
            }
        }
    }

    /// Sets `text` as the body with a `text/html` content type.
    pub fn html(&mut self, text: impl Into<String>) -> Result<&mut Self, ContextError> {
        self.set_body(text)?;
        self.transport
            .response_mut()
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Ok(self)
    }

    /// Serializes `value` with the registered serializer and sets it as an
    /// `application/json` body.
    ///
    /// # Errors
    ///
    /// [`ContextError::MissingCapability`] without a serializer, in which case
    /// the body is left as it was, and [`ContextError::Serialize`] when the
    /// value cannot be represented.
    ///
    /// ```rust
    /// # #[cfg(feature = "json")]
    /// # {
    /// use http_context::{Capabilities, Context, HttpExchange, Request};
    /// use std::sync::Arc;
    ///
    /// let mut exchange = HttpExchange::new(Request::default());
    /// let mut ctx = Context::new(&mut exchange, Default::default(), Vec::new(), Arc::new(Capabilities::json()));
    /// ctx.json(&serde_json::json!({ "id": 7 })).unwrap();
    /// assert_eq!(ctx.response_body(), Some(r#"{"id":7}"#));
    /// # }
    /// ```
    pub fn json<V: Serialize + ?Sized>(&mut self, value: &V) -> Result<&mut Self, ContextError> {
        self.ensure_open()?;
        let serializer = self
            .capabilities
            .serializer()
            .ok_or(ContextError::MissingCapability(Capability::Serializer))?;
        let value =
            serde_json::to_value(value).map_err(|error| ContextError::Serialize(error.into()))?;
        let text = serializer.to_text(&value).map_err(ContextError::Serialize)?;
        self.set_body(text)?;
        self.transport.response_mut().headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    /// Renders the template at `path` with the engine registered for `engine`
    /// and sets the result as an HTML body.
    ///
    /// # Errors
    ///
    /// [`ContextError::MissingCapability`] when no such engine is registered,
    /// [`ContextError::Render`] when the engine fails.
    pub fn render<M: Serialize + ?Sized>(
        &mut self,
        engine: EngineKind,
        path: &str,
        model: &M,
    ) -> Result<&mut Self, ContextError> {
        self.ensure_open()?;
        let renderer = self
            .capabilities
            .template_engine(engine)
            .ok_or(ContextError::MissingCapability(Capability::TemplateEngine(engine)))?;
        let model =
            serde_json::to_value(model).map_err(|error| ContextError::Serialize(error.into()))?;
        let text = renderer
            .render(path, &model)
            .map_err(|source| ContextError::Render {
                engine,
                path: path.to_owned(),
                source,
            })?;
        self.html(text)
    }

    /// The charset override, if one was set.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Overrides the charset used to read the request body and to write the
    /// text response body.
    pub fn set_encoding(&mut self, charset: impl Into<String>) -> &mut Self {
        self.encoding = Some(charset.into());
        self
    }

    /// Appends a session cookie.
    #[cfg(feature = "cookie")]
    pub fn set_cookie(&mut self, name: &str, value: &str) -> Result<&mut Self, ContextError> {
        self.add_cookie(&cookie::Cookie::new(name, value))
    }

    /// Appends a cookie that expires after `seconds`.
    ///
    /// A negative value yields a session cookie and zero expires it at once.
    #[cfg(feature = "cookie")]
    pub fn set_cookie_with_max_age(
        &mut self,
        name: &str,
        value: &str,
        seconds: i64,
    ) -> Result<&mut Self, ContextError> {
        let mut built = cookie::Cookie::new(name, value);
        if seconds >= 0 {
            built.set_max_age(cookie::time::Duration::seconds(seconds));
        }
        self.add_cookie(&built)
    }

    /// Appends a `Set-Cookie` header for a fully built cookie.
    ///
    /// ```rust
    /// use http_context::cookie::Cookie;
    /// use http_context::{Capabilities, Context, HttpExchange, Request, Transport};
    ///
    /// let mut exchange = HttpExchange::new(Request::default());
    /// let mut ctx = Context::new(&mut exchange, Default::default(), Vec::new(), Capabilities::shared());
    /// let session = Cookie::build(("sid", "abc")).path("/").secure(true).http_only(true);
    /// ctx.add_cookie(&session.build()).unwrap();
    /// ctx.finish().unwrap();
    ///
    /// assert_eq!(
    ///     exchange.response().headers()["set-cookie"],
    ///     "sid=abc; HttpOnly; Secure; Path=/"
    /// );
    /// ```
    #[cfg(feature = "cookie")]
    pub fn add_cookie(&mut self, cookie: &cookie::Cookie<'_>) -> Result<&mut Self, ContextError> {
        self.ensure_open()?;
        let value = HeaderValue::from_str(&cookie.to_string())
            .map_err(|_| ContextError::InvalidHeader(header::SET_COOKIE.to_string()))?;
        self.transport
            .response_mut()
            .headers_mut()
            .append(header::SET_COOKIE, value);
        Ok(self)
    }

    /// Tells the client to drop the cookie `name` scoped to `path`.
    ///
    /// Only a `Set-Cookie` with `Max-Age=0` is emitted; the inbound cookies
    /// of this request are not touched.
    #[cfg(feature = "cookie")]
    pub fn remove_cookie(
        &mut self,
        path: Option<&str>,
        name: &str,
    ) -> Result<&mut Self, ContextError> {
        let mut expired = cookie::Cookie::new(name, "");
        expired.set_max_age(cookie::time::Duration::ZERO);
        if let Some(path) = path {
            expired.set_path(path);
        }
        self.add_cookie(&expired)
    }

    /// Redirects to `location` with `302 Found`.
    pub fn redirect(&mut self, location: &str) {
        self.redirect_with(location, StatusCode::FOUND);
    }

    /// Redirects to `location` with `status`.
    ///
    /// The transport writes the redirect immediately. A failure to do so, or
    /// an exchange that already completed, is logged and otherwise ignored.
    pub fn redirect_with(&mut self, location: &str, status: StatusCode) {
        if self.ensure_open().is_err() {
            tracing::warn!(location, "redirect after the exchange completed was dropped");
            return;
        }
        if let Err(error) = self.transport.send_redirect(location, status) {
            tracing::warn!(%error, location, status = status.as_u16(), "failed to send redirect");
        }
    }

    /// Hands the response body to the transport and ends the context.
    ///
    /// A text body is encoded in the [`encoding`](Self::encoding) override,
    /// else in the charset the content type declares, else in UTF-8. With an
    /// override the content type's `charset` is rewritten to match it, and a
    /// text body without a content type is sent as `text/plain`.
    ///
    /// # Errors
    ///
    /// [`ContextError::UnsupportedCharset`] when the chosen charset cannot be
    /// written, [`ContextError::ExchangeCompleted`] when a deferred exchange
    /// already handed its response over.
    pub fn finish(mut self) -> Result<(), ContextError> {
        self.flush()
    }

    /// Moves the pending body into the transport response.
    pub(crate) fn flush(&mut self) -> Result<(), ContextError> {
        self.ensure_open()?;
        let body = match core::mem::take(&mut self.body) {
            ResponseBody::Empty => return Ok(()),
            ResponseBody::Stream(body) => body,
            ResponseBody::Text(text) => match self.encode_text(&text) {
                Ok(body) => body,
                Err(error) => {
                    self.body = ResponseBody::Text(text);
                    return Err(error);
                }
            },
        };
        *self.transport.response_mut().body_mut() = body;
        Ok(())
    }

    fn encode_text(&mut self, text: &ByteStr) -> Result<Body, ContextError> {
        let headers = self.transport.response_mut().headers_mut();
        // None: no content type. Some(None): present but not a media type.
        let declared = headers
            .get(header::CONTENT_TYPE)
            .map(|value| value.to_str().ok().and_then(|value| value.parse::<Mime>().ok()));
        let label = match (&self.encoding, &declared) {
            (Some(label), _) => label.clone(),
            (None, Some(Some(parsed))) => parsed
                .get_param(mime::CHARSET)
                .map_or_else(|| "utf-8".to_owned(), |charset| charset.to_string()),
            (None, _) => "utf-8".to_owned(),
        };
        let charset = Charset::lookup(&label)?;

        let content_type = match declared {
            None => Some(format!("text/plain; charset={label}")),
            Some(Some(parsed)) if self.encoding.is_some() => Some(with_charset(&parsed, &label)),
            Some(_) => None,
        };
        if let Some(content_type) = content_type {
            let value = HeaderValue::from_str(&content_type)
                .map_err(|_| ContextError::InvalidHeader(content_type))?;
            headers.insert(header::CONTENT_TYPE, value);
        }

        Ok(match charset {
            Charset::Utf8 => Body::from_text(text.clone()),
            charset => Body::from_bytes(charset.encode(text.as_str().to_owned())),
        })
    }
}

/// `parsed` with its `charset` parameter replaced by `label`.
fn with_charset(parsed: &Mime, label: &str) -> String {
    let mut value = parsed.essence_str().to_owned();
    for (name, param) in parsed.params().filter(|(name, _)| *name != mime::CHARSET) {
        value.push_str(&format!("; {name}={param}"));
    }
    value.push_str("; charset=");
    value.push_str(label);
    value
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::sync::Arc;

    use serde::Serialize;
    use serde_json::Value;

    use crate::{
        BoxError, Capabilities, Completion, Context, ContextError, HttpExchange, Request,
        Response, Transport,
    };

    use super::*;

    fn ctx(exchange: &mut HttpExchange) -> Context<'_, HttpExchange> {
        Context::new(exchange, HashMap::new(), Vec::new(), Capabilities::shared())
    }

    #[test]
    fn text_and_stream_bodies_replace_each_other() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);

        ctx.set_body("hello").unwrap();
        assert_eq!(ctx.response_body(), Some("hello"));
        assert!(ctx.body_stream().is_none());

        ctx.set_body_stream(Body::from_bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(ctx.response_body(), None);
        assert!(ctx.body_stream().is_some());

        ctx.set_body("again").unwrap();
        assert!(ctx.take_body_stream().is_none());
        assert_eq!(ctx.response_body(), Some("again"));
    }

    #[test]
    fn setters_chain_on_the_same_context() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_status(StatusCode::ACCEPTED)
            .and_then(|ctx| ctx.set_header("x-trace", "abc"))
            .and_then(|ctx| ctx.set_header("X-Trace", "def"))
            .and_then(|ctx| ctx.html("<b>hi</b>"))
            .unwrap();
        ctx.finish().unwrap();

        let (_, response) = exchange.into_parts();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers().get_all("x-trace").iter().count(), 1);
        assert_eq!(response.headers()["x-trace"], "def");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        assert!(matches!(
            ctx.set_header("bad name", "v"),
            Err(ContextError::InvalidHeader(name)) if name == "bad name"
        ));
        assert!(ctx.set_header("x-ok", "line\nbreak").is_err());
    }

    #[test]
    fn json_without_serializer_keeps_the_body() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_body("previous").unwrap();

        let err = ctx.json(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ContextError::MissingCapability(Capability::Serializer)));
        assert_eq!(ctx.response_body(), Some("previous"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_sets_body_and_content_type() {
        #[derive(Serialize)]
        struct User<'a> {
            name: &'a str,
        }

        let mut exchange = HttpExchange::default();
        let mut ctx = Context::new(
            &mut exchange,
            HashMap::new(),
            Vec::new(),
            Arc::new(Capabilities::json()),
        );
        ctx.json(&User { name: "ada" }).unwrap();
        assert_eq!(ctx.response_body(), Some(r#"{"name":"ada"}"#));
        ctx.finish().unwrap();
        assert_eq!(
            exchange.response().headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }

    #[test]
    fn render_goes_through_the_selected_engine() {
        let capabilities = Capabilities::builder()
            .template_engine(EngineKind::Tera, |path: &str, model: &Value| {
                Ok::<_, BoxError>(format!("<h1>{path}:{}</h1>", model["title"]))
            })
            .template_engine(EngineKind::Handlebars, |_: &str, _: &Value| {
                Err::<String, BoxError>("missing partial".into())
            })
            .shared();
        let mut exchange = HttpExchange::default();
        let mut ctx = Context::new(&mut exchange, HashMap::new(), Vec::new(), capabilities);

        ctx.render(EngineKind::Tera, "index", &serde_json::json!({ "title": "Home" }))
            .unwrap();
        assert_eq!(ctx.response_body(), Some(r#"<h1>index:"Home"</h1>"#));

        assert!(matches!(
            ctx.render(EngineKind::Mustache, "index", &()),
            Err(ContextError::MissingCapability(Capability::TemplateEngine(
                EngineKind::Mustache
            )))
        ));
        let err = ctx.render(EngineKind::Handlebars, "page", &()).unwrap_err();
        assert_eq!(err.to_string(), "`handlebars` template engine failed to render `page`");
    }

    #[cfg(feature = "cookie")]
    #[test]
    fn remove_cookie_only_emits_an_expiry() {
        let request = http::Request::builder()
            .header(header::COOKIE, "session=abc; theme=dark")
            .body(Body::empty())
            .unwrap();
        let mut exchange = HttpExchange::new(request);
        let mut ctx = ctx(&mut exchange);

        ctx.remove_cookie(Some("/"), "session").unwrap();
        assert_eq!(ctx.cookie("session").as_deref(), Some("abc"));
        assert_eq!(ctx.cookie_map().len(), 2);
        ctx.finish().unwrap();

        let set_cookie = &exchange.response().headers()[header::SET_COOKIE];
        assert_eq!(set_cookie, "session=; Path=/; Max-Age=0");
    }

    #[cfg(feature = "cookie")]
    #[test]
    fn cookies_are_appended() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_cookie("a", "1")
            .unwrap()
            .set_cookie_with_max_age("b", "2", 60)
            .unwrap()
            .set_cookie_with_max_age("c", "3", -1)
            .unwrap();
        ctx.finish().unwrap();

        let values: Vec<_> = exchange
            .response()
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(values, vec!["a=1", "b=2; Max-Age=60", "c=3"]);
    }

    #[test]
    fn redirect_uses_the_transport() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.redirect("/login");
        assert_eq!(ctx.status(), StatusCode::FOUND);
        ctx.redirect_with("/moved", StatusCode::MOVED_PERMANENTLY);
        drop(ctx);

        assert_eq!(exchange.response().status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(exchange.response().headers()[header::LOCATION], "/moved");
    }

    #[test]
    fn redirect_failures_are_swallowed() {
        #[derive(Default)]
        struct Closed(HttpExchange);

        impl Transport for Closed {
            fn request(&self) -> &Request {
                self.0.request()
            }
            fn request_mut(&mut self) -> &mut Request {
                self.0.request_mut()
            }
            fn response(&self) -> &Response {
                self.0.response()
            }
            fn response_mut(&mut self) -> &mut Response {
                self.0.response_mut()
            }
            fn start_async(&mut self) -> Completion {
                self.0.start_async()
            }
            fn send_redirect(&mut self, _: &str, _: StatusCode) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
            }
        }

        let mut transport = Closed::default();
        let mut ctx = Context::new(&mut transport, HashMap::new(), Vec::new(), Capabilities::shared());
        ctx.redirect("/elsewhere");
        assert_eq!(ctx.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn finish_encodes_text_in_the_override_charset() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_encoding("ISO-8859-1")
            .set_content_type("text/plain")
            .and_then(|ctx| ctx.set_body("café"))
            .unwrap();
        ctx.finish().unwrap();

        let (_, response) = exchange.into_parts();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=ISO-8859-1"
        );
        let bytes = response.into_body().into_bytes().await.unwrap();
        assert_eq!(bytes.as_ref(), &[0x63, 0x61, 0x66, 0xE9]);
    }

    #[tokio::test]
    async fn finish_moves_a_stream_and_keeps_content_type() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_content_type("application/pdf")
            .and_then(|ctx| ctx.set_body_stream(Body::from_bytes(b"%PDF".to_vec())))
            .unwrap();
        ctx.finish().unwrap();

        let (_, response) = exchange.into_parts();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(response.into_body().into_bytes().await.unwrap().as_ref(), b"%PDF");
    }

    #[test]
    fn finish_rejects_unknown_charsets() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_encoding("koi8-r").set_body("text").unwrap();
        assert!(matches!(ctx.finish(), Err(ContextError::UnsupportedCharset(_))));
    }

    #[tokio::test]
    async fn override_rewrites_a_declared_charset() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_encoding("ISO-8859-1")
            .set_content_type("text/html; charset=utf-8")
            .and_then(|ctx| ctx.set_body("café"))
            .unwrap();
        ctx.finish().unwrap();

        let (_, response) = exchange.into_parts();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=ISO-8859-1"
        );
        let bytes = response.into_body().into_bytes().await.unwrap();
        assert_eq!(bytes.as_ref(), &[0x63, 0x61, 0x66, 0xE9]);
    }

    #[tokio::test]
    async fn declared_charset_is_used_without_an_override() {
        let mut exchange = HttpExchange::default();
        let mut ctx = ctx(&mut exchange);
        ctx.set_content_type("text/csv; header=present; charset=iso-8859-1")
            .and_then(|ctx| ctx.set_body("é"))
            .unwrap();
        ctx.finish().unwrap();

        let (_, response) = exchange.into_parts();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; header=present; charset=iso-8859-1"
        );
        assert_eq!(response.into_body().into_bytes().await.unwrap().as_ref(), &[0xE9]);
    }

    #[test]
    fn other_parameters_survive_a_charset_rewrite() {
        let parsed: Mime = "text/csv; charset=utf-8; header=present".parse().unwrap();
        assert_eq!(
            with_charset(&parsed, "us-ascii"),
            "text/csv; header=present; charset=us-ascii"
        );
    }
}
