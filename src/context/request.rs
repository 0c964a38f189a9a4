//! Read side of [`Context`]: bindings, parameters, body and metadata.
use core::any::Any;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use bytes::Bytes;
use http::{header, HeaderMap, Method, Uri, Version};
use mime::Mime;
use serde::de::DeserializeOwned;

use super::{Context, ContextError};
use crate::charset::Charset;
use crate::params::{form_value, normalize, query_pairs};
use crate::{Attributes, Capability, Transport};

impl<T: Transport + ?Sized> Context<'_, T> {
    /// Value bound to the path parameter `name`.
    ///
    /// The lookup ignores case and accepts the name with or without its
    /// leading colon, so `id`, `:id` and `ID` all find `:id`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(&normalize(name)).map(String::as_str)
    }

    /// A copy of every path parameter, keyed `:name`.
    pub fn param_map(&self) -> HashMap<String, String> {
        self.params.clone()
    }

    /// The wildcard segment captured at `index`.
    ///
    /// # Errors
    ///
    /// [`ContextError::SplatOutOfRange`] when the route captured fewer segments.
    pub fn splat(&self, index: usize) -> Result<&str, ContextError> {
        self.splats
            .get(index)
            .map(String::as_str)
            .ok_or(ContextError::SplatOutOfRange {
                index,
                len: self.splats.len(),
            })
    }

    /// A copy of every wildcard segment, in path order.
    pub fn splats(&self) -> Vec<String> {
        self.splats.clone()
    }

    /// The raw request payload.
    ///
    /// The body is buffered in the request on first read, so repeated calls
    /// are cheap and see the same bytes.
    ///
    /// # Errors
    ///
    /// [`ContextError::Body`] when the transport fails mid-read. The cause is
    /// logged here with full detail; the error message stays generic.
    pub async fn body_as_bytes(&mut self) -> Result<Bytes, ContextError> {
        let request = self.transport.request_mut();
        match request.body_mut().to_bytes().await {
            Ok(bytes) => Ok(bytes),
            Err(error) => {
                tracing::error!(
                    error = %error,
                    method = %request.method(),
                    path = %request.uri().path(),
                    "failed to read request body"
                );
                Err(ContextError::Body(error))
            }
        }
    }

    /// The request payload decoded as text.
    ///
    /// The charset is the [`encoding`](Self::encoding) override if set, else
    /// the `charset` of the request `Content-Type`, else UTF-8.
    pub async fn body(&mut self) -> Result<String, ContextError> {
        let charset = self.request_charset()?;
        let bytes = self.body_as_bytes().await?;
        charset.decode(&bytes)
    }

    /// The request payload parsed by the registered serializer into a `B`.
    ///
    /// # Errors
    ///
    /// [`ContextError::MissingCapability`] without a serializer, and
    /// [`ContextError::Parse`] when the payload does not fit `B`.
    pub async fn body_as_object<B: DeserializeOwned>(&mut self) -> Result<B, ContextError> {
        if !self.capabilities.has_serializer() {
            return Err(ContextError::MissingCapability(Capability::Serializer));
        }
        let text = self.body().await?;
        let serializer = self
            .capabilities
            .serializer()
            .ok_or(ContextError::MissingCapability(Capability::Serializer))?;
        let value = serializer.from_text(&text).map_err(ContextError::Parse)?;
        serde_json::from_value(value).map_err(|error| ContextError::Parse(error.into()))
    }

    /// A field of an `application/x-www-form-urlencoded` body.
    ///
    /// The key matches case-insensitively and the first pair wins. The value
    /// is returned exactly as sent, without percent-decoding; see
    /// [`form_value`](crate::params::form_value) for the pair rules.
    pub async fn form_param(&mut self, name: &str) -> Result<Option<String>, ContextError> {
        let body = self.body().await?;
        Ok(form_value(&body, name).map(str::to_owned))
    }

    /// First value of the query parameter `name`, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query()
            .into_iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    /// Every value of the query parameter `name`, in order.
    pub fn query_param_values(&self, name: &str) -> Vec<String> {
        self.query()
            .into_iter()
            .filter_map(|(key, value)| (key == name).then_some(value))
            .collect()
    }

    /// Distinct query parameter names, in first-seen order.
    pub fn query_params(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.query()
            .into_iter()
            .filter_map(|(key, _)| seen.insert(key.clone()).then_some(key))
            .collect()
    }

    /// Every query parameter with all of its values.
    pub fn query_param_map(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in self.query() {
            map.entry(key).or_default().push(value);
        }
        map
    }

    /// The query parameter `name`, or `default` when it is absent.
    ///
    /// A parameter that is present with an empty value yields `""`.
    pub fn query_param_or_default(&self, name: &str, default: &str) -> String {
        self.query_param(name).unwrap_or_else(|| default.to_owned())
    }

    /// The request header `name`, matched case-insensitively.
    ///
    /// Values that are not visible ASCII read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name)?.to_str().ok()
    }

    /// Every request header.
    pub fn header_map(&self) -> &HeaderMap {
        self.headers()
    }

    /// The value of the inbound cookie `name`.
    #[cfg(feature = "cookie")]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.request_cookies()
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_owned())
    }

    /// Every inbound cookie. A name sent twice keeps its first value.
    #[cfg(feature = "cookie")]
    pub fn cookie_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for cookie in self.request_cookies() {
            map.entry(cookie.name().to_owned())
                .or_insert_with(|| cookie.value().to_owned());
        }
        map
    }

    /// Stores `value` in the request's attribute table under `key`.
    pub fn set_attribute<V>(&mut self, key: impl Into<String>, value: V) -> &mut Self
    where
        V: Any + Send + Sync,
    {
        let extensions = self.transport.request_mut().extensions_mut();
        let mut attributes = extensions.remove::<Attributes>().unwrap_or_default();
        attributes.insert(key, value);
        extensions.insert(attributes);
        self
    }

    /// The attribute `key` as a `V`.
    ///
    /// # Errors
    ///
    /// [`ContextError::AttributeType`] if the stored value is not a `V`.
    pub fn attribute<V>(&self, key: &str) -> Result<Option<&V>, ContextError>
    where
        V: Any + Send + Sync,
    {
        match self.transport.request().extensions().get::<Attributes>() {
            Some(attributes) => attributes.get(key),
            None => Ok(None),
        }
    }

    /// A snapshot of the attribute table.
    pub fn attribute_map(&self) -> Attributes {
        self.transport
            .request()
            .extensions()
            .get::<Attributes>()
            .cloned()
            .unwrap_or_default()
    }

    /// The host the client addressed: the `Host` header, else the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST.as_str())
            .or_else(|| self.uri().host())
    }

    /// IP address of the remote peer.
    pub fn ip(&self) -> Option<IpAddr> {
        self.transport.peer_addr().map(|addr| addr.ip())
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        self.uri().path()
    }

    /// The port the client addressed, falling back to the local port.
    pub fn port(&self) -> Option<u16> {
        self.uri()
            .port_u16()
            .or_else(|| {
                let host = self.header(header::HOST.as_str())?;
                host.parse::<http::uri::Authority>().ok()?.port_u16()
            })
            .or_else(|| self.transport.local_addr().map(|addr| addr.port()))
    }

    /// The protocol version, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> &'static str {
        match self.transport.request().version() {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "HTTP/1.1",
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        self.transport.request().method()
    }

    /// `http` or `https`, from the URI or the connection.
    pub fn scheme(&self) -> &str {
        match self.uri().scheme_str() {
            Some(scheme) => scheme,
            None if self.transport.is_secure() => "https",
            None => "http",
        }
    }

    /// The request target as received.
    pub fn uri(&self) -> &Uri {
        self.transport.request().uri()
    }

    /// The reconstructed request URL without the query string.
    pub fn url(&self) -> String {
        let host = self
            .host()
            .map(str::to_owned)
            .or_else(|| self.transport.local_addr().map(|addr| addr.to_string()))
            .unwrap_or_default();
        format!("{}://{}{}", self.scheme(), host, self.path())
    }

    /// The `User-Agent` header.
    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    /// The declared `Content-Length`.
    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH.as_str())?.trim().parse().ok()
    }

    /// The request `Content-Type`.
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Whether the client's `Accept` header admits `media_type`.
    ///
    /// Wildcards (`*/*`, `text/*`) match and `q=0` entries exclude. A request
    /// without `Accept` accepts anything.
    ///
    /// ```rust
    /// # use http_context::{Capabilities, Context, HttpExchange, Request};
    /// let request = http::Request::builder()
    ///     .header("accept", "text/html, application/*;q=0.5, image/png;q=0")
    ///     .body(Default::default())
    ///     .unwrap();
    /// let mut exchange = HttpExchange::new(request);
    /// let ctx = Context::new(&mut exchange, Default::default(), Vec::new(), Capabilities::shared());
    ///
    /// assert!(ctx.accepts("text/html"));
    /// assert!(ctx.accepts("application/json"));
    /// assert!(!ctx.accepts("image/png"));
    /// assert!(!ctx.accepts("text/plain"));
    /// ```
    pub fn accepts(&self, media_type: &str) -> bool {
        let Ok(wanted) = media_type.parse::<Mime>() else {
            return false;
        };
        let accept: Vec<&str> = self
            .headers()
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if accept.is_empty() {
            return true;
        }
        accept
            .iter()
            .flat_map(|value| value.split(','))
            .filter_map(|range| range.trim().parse::<Mime>().ok())
            .filter(|range| {
                range
                    .get_param("q")
                    .and_then(|q| q.as_str().parse::<f32>().ok())
                    .is_none_or(|q| q > 0.0)
            })
            .any(|range| {
                let type_matches = range.type_() == mime::STAR || range.type_() == wanted.type_();
                let subtype_matches =
                    range.subtype() == mime::STAR || range.subtype() == wanted.subtype();
                type_matches && subtype_matches
            })
    }

    fn headers(&self) -> &HeaderMap {
        self.transport.request().headers()
    }

    fn query(&self) -> Vec<(String, String)> {
        query_pairs(self.uri().query())
    }

    fn request_charset(&self) -> Result<Charset, ContextError> {
        if let Some(encoding) = &self.encoding {
            return Charset::lookup(encoding);
        }
        let declared = self
            .content_type()
            .and_then(|value| value.parse::<Mime>().ok())
            .and_then(|parsed| parsed.get_param(mime::CHARSET).map(|charset| charset.to_string()));
        match declared {
            Some(charset) => Charset::lookup(&charset),
            None => Ok(Charset::Utf8),
        }
    }

    #[cfg(feature = "cookie")]
    fn request_cookies(&self) -> impl Iterator<Item = cookie::Cookie<'_>> {
        self.headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(cookie::Cookie::split_parse)
            .filter_map(Result::ok)
    }
}
