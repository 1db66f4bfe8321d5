//! The consumer-supplied side of a fetch.
//!
//! A [`Transport`] performs the actual I/O for a key. The loader treats it as
//! opaque: it awaits the returned future, and on failure asks the transport to
//! [`classify`](Transport::classify) the error. Nothing else about the response
//! is interpreted.
//!
//! Transports are not required to support cancellation. The loader tolerates a
//! response that arrives after its request was superseded and simply drops it.

use crate::config::FetchTimeoutMs;
use crate::errors::{ErrorKind, TimeoutError};
use std::future::Future;

/// Performs the network call (or any other I/O) for a key.
///
/// # Example
///
/// ```rust,ignore
/// struct PostsApi {
///     client: HttpClient,
/// }
///
/// impl Transport<PostQuery, Vec<Post>> for PostsApi {
///     type Error = ApiError;
///
///     fn fetch(&self, key: PostQuery) -> impl Future<Output = Result<Vec<Post>, ApiError>> + Send {
///         self.client.get_json(key.to_url())
///     }
///
///     fn classify(&self, error: &ApiError) -> ErrorKind {
///         match error {
///             ApiError::Status(code) => ErrorKind::Response(*code),
///             ApiError::Io(_) => ErrorKind::Network,
///             ApiError::Json(_) => ErrorKind::Decode,
///         }
///     }
/// }
/// ```
pub trait Transport<K, T>: Send + Sync + 'static {
    /// Failure type of a fetch.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the resource identified by `key`.
    fn fetch(&self, key: K) -> impl Future<Output = Result<T, Self::Error>> + Send;

    /// Classifies a failure for the published [`ErrorInfo`](crate::ErrorInfo).
    fn classify(&self, _error: &Self::Error) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A transport backed by a closure; see [`transport_fn`].
#[derive(Debug, Clone)]
pub struct FnTransport<F> {
    fetch: F,
}

/// Turns an async closure into a [`Transport`].
///
/// Failures are classified as [`ErrorKind::Other`]; implement [`Transport`]
/// directly when a finer classification is needed.
///
/// ```rust,ignore
/// let transport = transport_fn(|id: u64| async move { api.user(id).await });
/// ```
pub fn transport_fn<F>(fetch: F) -> FnTransport<F> {
    FnTransport { fetch }
}

impl<K, T, E, F, Fut> Transport<K, T> for FnTransport<F>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn fetch(&self, key: K) -> impl Future<Output = Result<T, E>> + Send {
        (self.fetch)(key)
    }
}

/// Transport adapter failing fetches that take longer than a fixed timeout.
///
/// The loader imposes no timeout of its own; wrap the transport instead:
///
/// ```rust,ignore
/// let transport = api.with_timeout(FetchTimeoutMs::try_new(5_000)?);
/// ```
#[derive(Debug, Clone)]
pub struct Timeout<Tr> {
    inner: Tr,
    timeout: FetchTimeoutMs,
}

impl<Tr> Timeout<Tr> {
    /// Wraps `inner` with `timeout`.
    pub const fn new(inner: Tr, timeout: FetchTimeoutMs) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped transport.
    pub const fn inner(&self) -> &Tr {
        &self.inner
    }
}

impl<K, T, Tr> Transport<K, T> for Timeout<Tr>
where
    Tr: Transport<K, T>,
    K: Send,
{
    type Error = TimeoutError<Tr::Error>;

    fn fetch(&self, key: K) -> impl Future<Output = Result<T, Self::Error>> + Send {
        let limit = self.timeout.as_duration();
        let request = self.inner.fetch(key);

        async move {
            match tokio::time::timeout(limit, request).await {
                Ok(result) => result.map_err(TimeoutError::Transport),
                Err(_) => Err(TimeoutError::Elapsed(limit)),
            }
        }
    }

    fn classify(&self, error: &Self::Error) -> ErrorKind {
        match error {
            TimeoutError::Elapsed(_) => ErrorKind::Timeout,
            TimeoutError::Transport(inner) => self.inner.classify(inner),
        }
    }
}

/// Combinators available on every transport.
pub trait TransportExt: Sized {
    /// Wraps this transport in a [`Timeout`].
    fn with_timeout(self, timeout: FetchTimeoutMs) -> Timeout<Self>;
}

impl<Tr> TransportExt for Tr {
    fn with_timeout(self, timeout: FetchTimeoutMs) -> Timeout<Self> {
        Timeout::new(self, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq, Eq)]
    enum ApiError {
        #[error("status {0}")]
        Status(u16),
    }

    struct StatusApi;

    impl Transport<u16, String> for StatusApi {
        type Error = ApiError;

        fn fetch(&self, key: u16) -> impl Future<Output = Result<String, ApiError>> + Send {
            async move {
                if key == 200 {
                    Ok("ok".to_string())
                } else {
                    Err(ApiError::Status(key))
                }
            }
        }

        fn classify(&self, error: &ApiError) -> ErrorKind {
            match error {
                ApiError::Status(code) => ErrorKind::Response(*code),
            }
        }
    }

    fn timeout_ms(ms: u64) -> FetchTimeoutMs {
        FetchTimeoutMs::try_new(ms).expect("valid timeout")
    }

    #[tokio::test]
    async fn closure_transport_forwards_key_and_result() {
        let transport = transport_fn(|key: String| async move {
            Ok::<_, std::io::Error>(format!("fetched {key}"))
        });

        let result = transport.fetch("posts".to_string()).await;

        assert_eq!(result.expect("fetch succeeds"), "fetched posts");
    }

    #[tokio::test]
    async fn closure_transport_classifies_as_other() {
        let transport = transport_fn(|_key: u8| async move {
            Err::<(), _>(std::io::Error::other("down"))
        });

        let error = transport.fetch(1).await.expect_err("fetch fails");

        assert_eq!(
            Transport::<u8, ()>::classify(&transport, &error),
            ErrorKind::Other
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_elapses_for_slow_fetch() {
        let transport = transport_fn(|_key: ()| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, std::io::Error>("late")
        })
        .with_timeout(timeout_ms(100));

        let error = transport.fetch(()).await.expect_err("fetch times out");

        assert!(matches!(error, TimeoutError::Elapsed(limit) if limit == Duration::from_millis(100)));
        assert_eq!(
            Transport::<(), &str>::classify(&transport, &error),
            ErrorKind::Timeout
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_passes_fast_fetch_through() {
        let transport = StatusApi.with_timeout(timeout_ms(100));

        let result = transport.fetch(200_u16).await;

        assert_eq!(result.expect("fetch succeeds"), "ok");
    }

    #[tokio::test]
    async fn timeout_delegates_classification_of_inner_errors() {
        let transport = StatusApi.with_timeout(timeout_ms(1_000));

        let error = transport.fetch(404_u16).await.expect_err("fetch fails");

        assert_eq!(
            Transport::<u16, String>::classify(&transport, &error),
            ErrorKind::Response(404)
        );
    }
}
