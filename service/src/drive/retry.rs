use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{
    default_on_request_failure, default_on_request_success, RetryTransientMiddleware, Retryable,
    RetryableStrategy,
};

/// Retries on transient transport errors and on `401`, matching the `RetryOnError` strategy this
/// is adapted from — the drive's session can expire mid-job and a retried request sent after the
/// executor's own `refresh()` call should succeed.
pub struct RetryOnUnauthorized;

impl RetryableStrategy for RetryOnUnauthorized {
    fn handle(&self, res: &reqwest_middleware::Result<Response>) -> Option<Retryable> {
        match res {
            Err(reqwest_middleware::Error::Middleware(_)) => Some(Retryable::Transient),
            Err(e @ reqwest_middleware::Error::Reqwest(_)) => default_on_request_failure(e),
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => Some(Retryable::Transient),
            Ok(resp) => default_on_request_success(resp),
        }
    }
}

pub fn build_http_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy_and_strategy(
            retry_policy,
            RetryOnUnauthorized,
        ))
        .build()
}
