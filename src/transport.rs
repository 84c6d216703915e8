use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::{Operation, TransportError};
use crate::models::{CreatedReply, NewMessage, ServerMessage};

/// Authenticated calls against the message backend.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn list_messages(
        &self,
        token: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ServerMessage>, TransportError>;

    async fn create_message(
        &self,
        token: &str,
        message: &NewMessage,
    ) -> Result<ServerMessage, TransportError>;

    async fn delete_message(&self, token: &str, id: &str) -> Result<(), TransportError>;

    /// `Ok(None)` when the backend does not know the id.
    async fn fetch_message(
        &self,
        token: &str,
        id: &str,
    ) -> Result<Option<ServerMessage>, TransportError>;

    async fn search_messages(
        &self,
        token: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ServerMessage>, TransportError>;
}

/// JSON over HTTP, bearer-token authenticated.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("{} cannot be used as an API base URL", base_url);
        }
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(HttpTransport {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Checks the public well-known config endpoint, the same check the web
    /// app ran before redirecting to sign-in.
    pub async fn auth_health(&self) -> Result<serde_json::Value, TransportError> {
        let op = Operation::AuthHealth;
        let request = self.client.get(self.endpoint(&["pub", "auth-well-known-config"]));
        let response = send(op, request).await?;
        decode(op, response).await
    }
}

async fn send(op: Operation, request: RequestBuilder) -> Result<Response, TransportError> {
    let response = request.send().await.map_err(|e| {
        warn!("{} request failed: {}", op, e);
        TransportError::failed(op, e)
    })?;
    let status = response.status();
    debug!("{} -> {}", op, status);
    if status.is_success() {
        Ok(response)
    } else {
        Err(status_error(op, status))
    }
}

fn status_error(op: Operation, status: StatusCode) -> TransportError {
    let reason = status.canonical_reason().unwrap_or("Unexpected status");
    warn!("{} rejected with {}", op, status);
    TransportError::status(op, status.as_u16(), reason)
}

async fn decode<T: DeserializeOwned>(
    op: Operation,
    response: Response,
) -> Result<T, TransportError> {
    response
        .json::<T>()
        .await
        .map_err(|e| TransportError::failed(op, format!("invalid response body: {}", e)))
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn list_messages(
        &self,
        token: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ServerMessage>, TransportError> {
        let op = Operation::ListMessages;
        let request = self
            .client
            .get(self.endpoint(&["messages"]))
            .bearer_auth(token)
            .query(&[("limit", limit), ("offset", offset)]);
        let response = send(op, request).await?;
        decode(op, response).await
    }

    async fn create_message(
        &self,
        token: &str,
        message: &NewMessage,
    ) -> Result<ServerMessage, TransportError> {
        let op = Operation::CreateMessage;
        let request = self
            .client
            .post(self.endpoint(&["messages"]))
            .bearer_auth(token)
            .json(message);
        let response = send(op, request).await?;
        let reply: CreatedReply = decode(op, response).await?;
        Ok(reply.into_server_message(message))
    }

    async fn delete_message(&self, token: &str, id: &str) -> Result<(), TransportError> {
        let op = Operation::DeleteMessage;
        let request = self
            .client
            .delete(self.endpoint(&["messages", id]))
            .bearer_auth(token);
        send(op, request).await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        token: &str,
        id: &str,
    ) -> Result<Option<ServerMessage>, TransportError> {
        let op = Operation::FetchMessage;
        let response = self
            .client
            .get(self.endpoint(&["messages", id]))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TransportError::failed(op, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => decode(op, response).await.map(Some),
            status => Err(status_error(op, status)),
        }
    }

    async fn search_messages(
        &self,
        token: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ServerMessage>, TransportError> {
        let op = Operation::SearchMessages;
        let request = self
            .client
            .get(self.endpoint(&["search", "messages"]))
            .bearer_auth(token)
            .query(&[
                ("query", query.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ]);
        let response = send(op, request).await?;
        decode(op, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_join_onto_base_path() {
        let transport = HttpTransport::new("http://localhost:8080/api/", None).unwrap();
        assert_eq!(
            transport.endpoint(&["messages", "42"]).as_str(),
            "http://localhost:8080/api/messages/42"
        );
        let bare = HttpTransport::new("http://localhost:8080", None).unwrap();
        assert_eq!(bare.endpoint(&["messages"]).as_str(), "http://localhost:8080/messages");
    }

    #[test]
    fn test_ids_are_escaped_as_one_segment() {
        let transport = HttpTransport::new("http://localhost:8080", None).unwrap();
        assert_eq!(
            transport.endpoint(&["messages", "a/b"]).as_str(),
            "http://localhost:8080/messages/a%2Fb"
        );
    }

    #[test]
    fn test_rejects_non_base_urls() {
        assert!(HttpTransport::new("mailto:someone@example.com", None).is_err());
        assert!(HttpTransport::new("not a url", None).is_err());
    }
}
