mod http;

pub use self::http::{
    HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult, ValidatedUrl,
    DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS,
};

use std::sync::Arc;

/// The one effect the core cannot perform itself: executing an HTTP request.
///
/// The host shell implements this over its platform stack (OkHttp, URLSession,
/// a Rust HTTP client...). An `Err` means no response was obtained; any
/// response that arrived, whatever its status, is an `Ok`.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> HttpResult;
}

#[async_trait::async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        (**self).execute(request).await
    }
}
