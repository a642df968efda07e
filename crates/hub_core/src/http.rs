use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode};
use tracing::debug;

use crate::bounded::{FetchMethod, Operation, OperationRequest};

/// A successful (2xx) HTTP response.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: StatusCode,
    pub final_url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// One HTTP request per attempt. Non-2xx responses are failures.
#[derive(Debug, Clone, Default)]
pub struct HttpFetch {
    http: Client,
}

impl HttpFetch {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Operation for HttpFetch {
    type Output = FetchedBody;

    async fn attempt(&self, request: &OperationRequest, attempt: u32) -> anyhow::Result<FetchedBody> {
        let options = request.options();
        let mut builder = match options.method {
            FetchMethod::Get => self.http.get(request.target()),
            FetchMethod::Head => self.http.head(request.target()),
        };
        if let Some(accept) = &options.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("request to {} failed", request.target()))?
            .error_for_status()?;
        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading body of {} failed", request.target()))?
            .to_vec();
        debug!(
            op_target = request.target(),
            attempt,
            status = status.as_u16(),
            bytes = body.len(),
            "http: fetched"
        );
        Ok(FetchedBody {
            status,
            final_url,
            headers,
            body,
        })
    }
}
