//! # Typed call descriptors for bound operations
//!
//! Every generated operation method returns an [`ApiCall`]: the verb, the
//! expanded path, query pairs and an optional JSON body, tagged with the type the
//! response decodes into. The caller decides how to run it:
//!
//! - [`ApiCall::send`] over a blocking [`ApiClient`]
//! - [`ApiCall::send_async`] over an [`AsyncApiClient`]
//!
//! Mapping overview:
//! - 2xx: the body is kept and decoded lazily through [`Response::parse`].
//! - anything else: [`ClientError::Http`] with the status and raw body.

use crate::client::{ApiClient, AsyncApiClient};
use crate::error::{ClientError, ClientResult, DecodeError, EncodeError, HttpError, TransportError};
use http::header::{ACCEPT, CONTENT_TYPE};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{self, Display};
use std::marker::PhantomData;

/// Content type of plain JSON bodies
pub const JSON: &str = "application/json";
/// Content type used for partial updates
pub const MERGE_PATCH: &str = "application/merge-patch+json";

/// Characters escaped inside a single path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// HTTP verb of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
    /// PATCH
    Patch,
}

impl Verb {
    /// Upper-case method string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
        }
    }

    /// Convert to an [`http::Method`]
    pub fn as_method(&self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Put => http::Method::PUT,
            Self::Post => http::Method::POST,
            Self::Delete => http::Method::DELETE,
            Self::Options => http::Method::OPTIONS,
            Self::Head => http::Method::HEAD,
            Self::Patch => http::Method::PATCH,
        }
    }

    /// Parse a lower-case verb key as it appears in a path item
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "get" => Some(Self::Get),
            "put" => Some(Self::Put),
            "post" => Some(Self::Post),
            "delete" => Some(Self::Delete),
            "options" => Some(Self::Options),
            "head" => Some(Self::Head),
            "patch" => Some(Self::Patch),
            _ => None,
        }
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully described call to one remote operation, decoding into `R` on success.
pub struct ApiCall<R> {
    verb: Verb,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    content_type: Option<&'static str>,
    deferred: Option<EncodeError>,
    _marker: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for ApiCall<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCall")
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl<R> ApiCall<R> {
    /// Start a call from a path template such as `/api/v1/namespaces/{namespace}/pods`
    pub fn new(verb: Verb, template: &str) -> Self {
        Self {
            verb,
            path: template.to_owned(),
            query: Vec::new(),
            body: None,
            content_type: None,
            deferred: None,
            _marker: PhantomData,
        }
    }

    /// Substitute the `{name}` placeholder with the percent-encoded value
    pub fn path_param(mut self, name: &str, value: impl Display) -> Self {
        let placeholder = format!("{{{}}}", name);
        let encoded = utf8_percent_encode(&value.to_string(), PATH_SEGMENT).to_string();
        self.path = self.path.replace(&placeholder, &encoded);
        self
    }

    /// Append a query pair when a value is present
    pub fn query(mut self, name: &str, value: Option<impl Display>) -> Self {
        if let Some(value) = value {
            self.query.push((name.to_owned(), value.to_string()));
        }
        self
    }

    /// Append one query pair per value
    pub fn query_all<I>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.query
            .extend(values.into_iter().map(|v| (name.to_owned(), v.to_string())));
        self
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// `PATCH` calls are sent as merge patches. Serialization failures are
    /// deferred and surface when the call is sent.
    pub fn json_body<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.body = Some(bytes);
                if self.content_type.is_none() {
                    self.content_type = Some(if self.verb == Verb::Patch {
                        MERGE_PATCH
                    } else {
                        JSON
                    });
                }
            }
            Err(err) => self.deferred = Some(EncodeError::Json(err)),
        }
        self
    }

    /// [`json_body`](Self::json_body) for optional bodies
    pub fn maybe_json_body<T: Serialize + ?Sized>(self, body: Option<&T>) -> Self {
        match body {
            Some(body) => self.json_body(body),
            None => self,
        }
    }

    /// Override the request content type
    pub fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// The call's verb
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The expanded path (placeholders already substituted)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query pairs in insertion order
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Encoded request body, if any
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Content type that will be sent with the body
    pub fn body_content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    /// Path plus encoded query string
    pub fn path_and_query(&self) -> Result<String, EncodeError> {
        if self.query.is_empty() {
            return Ok(self.path.clone());
        }
        let qs = serde_html_form::to_string(&self.query)?;
        Ok(format!("{}?{}", self.path, qs))
    }

    /// Build the HTTP request handed to a client
    pub fn into_request(self) -> ClientResult<http::Request<Vec<u8>>> {
        if let Some(err) = self.deferred {
            return Err(err.into());
        }
        let uri = self.path_and_query()?;
        let mut builder = http::Request::builder()
            .method(self.verb.as_method())
            .uri(uri)
            .header(ACCEPT, JSON);
        if let Some(content_type) = self.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder
            .body(self.body.unwrap_or_default())
            .map_err(|e| TransportError::from(e).into())
    }

    /// Send over a blocking client
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(verb = %self.verb, path = %self.path)))]
    pub fn send<C: ApiClient + ?Sized>(self, client: &C) -> ClientResult<Response<R>> {
        let request = self.into_request()?;
        let response = client
            .execute(request)
            .map_err(|e| TransportError::Other(Box::new(e)))?;
        process_response(response)
    }

    /// Send over an asynchronous client
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(verb = %self.verb, path = %self.path)))]
    pub async fn send_async<C: AsyncApiClient>(self, client: &C) -> ClientResult<Response<R>> {
        let request = self.into_request()?;
        let response = AsyncApiClient::execute(client, request)
            .await
            .map_err(|e| TransportError::Other(Box::new(e)))?;
        process_response(response)
    }
}

/// Turn a raw HTTP response into a typed [`Response`], mapping non-2xx statuses
/// to [`HttpError`].
#[inline]
pub fn process_response<R>(http_response: http::Response<Vec<u8>>) -> ClientResult<Response<R>> {
    let status = http_response.status();
    let body = http_response.into_body();

    if !status.is_success() {
        return Err(ClientError::Http(HttpError {
            status,
            body: Some(body),
        }));
    }

    Ok(Response::new(body, status))
}

/// Successful response of an [`ApiCall`]
pub struct Response<R> {
    status: http::StatusCode,
    body: Vec<u8>,
    _marker: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for Response<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl<R> Response<R> {
    /// Wrap a raw body
    pub fn new(body: Vec<u8>, status: http::StatusCode) -> Self {
        Self {
            status,
            body,
            _marker: PhantomData,
        }
    }

    /// HTTP status
    pub fn status(&self) -> http::StatusCode {
        self.status
    }

    /// Raw body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take the raw body
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body as text (for plain-text operations such as log reads)
    pub fn text(&self) -> Result<String, DecodeError> {
        Ok(String::from_utf8(self.body.clone())?)
    }

    /// Body as untyped JSON; an empty body is `null`
    pub fn value(&self) -> Result<serde_json::Value, DecodeError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl<R: DeserializeOwned> Response<R> {
    /// Decode the body into the operation's response type
    pub fn parse(&self) -> Result<R, DecodeError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_params_are_encoded() {
        let call: ApiCall<serde_json::Value> =
            ApiCall::new(Verb::Get, "/api/v1/namespaces/{namespace}/pods/{name}")
                .path_param("namespace", "kube system")
                .path_param("name", "a/b");
        assert_eq!(call.path(), "/api/v1/namespaces/kube%20system/pods/a%2Fb");
    }

    #[test]
    fn test_query_skips_absent_values() {
        let call: ApiCall<serde_json::Value> = ApiCall::new(Verb::Get, "/api/v1/pods")
            .query("watch", Some(true))
            .query("limit", None::<i64>)
            .query("labelSelector", Some("app=web"));
        assert_eq!(
            call.path_and_query().expect("encode"),
            "/api/v1/pods?watch=true&labelSelector=app%3Dweb"
        );
    }

    #[test]
    fn test_query_all_repeats_name() {
        let call: ApiCall<serde_json::Value> =
            ApiCall::new(Verb::Get, "/logs").query_all("container", ["a", "b"]);
        assert_eq!(
            call.query_pairs(),
            &[
                ("container".to_string(), "a".to_string()),
                ("container".to_string(), "b".to_string())
            ]
        );
    }

    #[test]
    fn test_patch_body_uses_merge_patch() {
        let call: ApiCall<serde_json::Value> =
            ApiCall::new(Verb::Patch, "/x").json_body(&serde_json::json!({"a": 1}));
        assert_eq!(call.body_content_type(), Some(MERGE_PATCH));
        let call: ApiCall<serde_json::Value> =
            ApiCall::new(Verb::Post, "/x").json_body(&serde_json::json!({"a": 1}));
        assert_eq!(call.body_content_type(), Some(JSON));
    }

    #[test]
    fn test_non_success_maps_to_http_error() {
        let response = http::Response::builder()
            .status(409)
            .body(b"{\"reason\":\"AlreadyExists\"}".to_vec())
            .expect("response");
        let err = process_response::<serde_json::Value>(response).expect_err("conflict");
        assert!(err.is_conflict());
    }
}
