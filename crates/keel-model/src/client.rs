//! Minimal HTTP client abstraction the generated models call through.
//!
//! Requests handed to a client carry a path-and-query URI only
//! (`/api/v1/namespaces/default/pods?pretty=true`); the client owns the base
//! address, credentials and transport.

use std::future::Future;
use std::sync::Arc;

/// Blocking HTTP client used by the synchronous CRUD surface and [`ApiCall::send`].
///
/// [`ApiCall::send`]: crate::ApiCall::send
pub trait ApiClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send an HTTP request and return the response.
    fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error>;
}

/// Asynchronous HTTP client, available for the low-level bound operations only.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait AsyncApiClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send an HTTP request and return the response.
    fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>>;
}

impl<T: ApiClient + ?Sized> ApiClient for &T {
    type Error = T::Error;

    fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        (**self).execute(request)
    }
}

impl<T: ApiClient + ?Sized> ApiClient for Arc<T> {
    type Error = T::Error;

    fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        self.as_ref().execute(request)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl<T: AsyncApiClient + Sync> AsyncApiClient for Arc<T> {
    type Error = T::Error;

    fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> + Send
    {
        self.as_ref().execute(request)
    }
}

#[cfg(feature = "reqwest-client")]
pub use reqwest_endpoint::Endpoint;

#[cfg(feature = "reqwest-client")]
mod reqwest_endpoint {
    use super::{ApiClient, AsyncApiClient};
    use crate::error::TransportError;
    use http::{HeaderMap, StatusCode};

    /// A `reqwest` client bound to an API server base address.
    ///
    /// `Endpoint<reqwest::blocking::Client>` implements [`ApiClient`],
    /// `Endpoint<reqwest::Client>` implements [`AsyncApiClient`].
    #[derive(Debug, Clone)]
    pub struct Endpoint<C> {
        client: C,
        base: url::Url,
    }

    impl<C> Endpoint<C> {
        /// Bind `client` to `base` (e.g. `https://10.0.0.1:6443`)
        pub fn new(client: C, base: url::Url) -> Self {
            Self { client, base }
        }

        /// Base address requests are resolved against
        pub fn base(&self) -> &url::Url {
            &self.base
        }

        fn resolve(&self, uri: &http::Uri) -> Result<url::Url, TransportError> {
            let path_and_query = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            self.base
                .join(path_and_query.trim_start_matches('/'))
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))
        }
    }

    fn rebuild(
        status: StatusCode,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> Result<http::Response<Vec<u8>>, TransportError> {
        let mut response = http::Response::builder().status(status);
        if let Some(target) = response.headers_mut() {
            target.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(response.body(body)?)
    }

    impl ApiClient for Endpoint<reqwest::blocking::Client> {
        type Error = TransportError;

        fn execute(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> Result<http::Response<Vec<u8>>, Self::Error> {
            let (parts, body) = request.into_parts();
            let url = self.resolve(&parts.uri)?;
            let resp = self
                .client
                .request(parts.method, url)
                .headers(parts.headers)
                .body(body)
                .send()
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.bytes().map_err(|e| TransportError::Other(Box::new(e)))?;
            rebuild(status, &headers, body.to_vec())
        }
    }

    impl AsyncApiClient for Endpoint<reqwest::Client> {
        type Error = TransportError;

        async fn execute(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> Result<http::Response<Vec<u8>>, Self::Error> {
            let (parts, body) = request.into_parts();
            let url = self.resolve(&parts.uri)?;
            let resp = self
                .client
                .request(parts.method, url)
                .headers(parts.headers)
                .body(body)
                .send()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp
                .bytes()
                .await
                .map_err(|e| TransportError::Other(Box::new(e)))?;
            rebuild(status, &headers, body.to_vec())
        }
    }
}
