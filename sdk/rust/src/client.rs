use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::types::{
    ApiErrorBody, ApprovalResult, Batch, ColdApprovalResult, ColdStorageRequest, Page, Transaction,
    TransactionRequest,
};

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine returned {status}: {}", .body.message)]
    Api { status: u16, body: ApiErrorBody },

    #[error("unexpected response ({status}): {text}")]
    Unexpected { status: u16, text: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SdkError {
    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::Api { status, .. } | SdkError::Unexpected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine readable error kind for API errors.
    pub fn kind(&self) -> Option<&str> {
        match self {
            SdkError::Api { body, .. } => Some(body.error.as_str()),
            _ => None,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Clone)]
pub struct CustodyClient {
    client: Client,
    base_url: String,
}

impl CustodyClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// WebSocket URL of the change notification stream.
    pub fn events_url(&self) -> String {
        let ws = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/api/v1/events", ws)
    }

    pub async fn health(&self) -> SdkResult<Value> {
        self.send(self.client.get(format!("{}/health", self.base_url))).await
    }

    pub async fn submit_transaction(&self, request: &TransactionRequest) -> SdkResult<Transaction> {
        self.send(self.client.post(self.api("/transactions")).json(request)).await
    }

    pub async fn get_transaction(&self, id: Uuid) -> SdkResult<Transaction> {
        self.send(self.client.get(self.api(&format!("/transactions/{}", id)))).await
    }

    /// List with query filters such as `("status", "pending")`.
    pub async fn list_transactions(&self, query: &[(&str, &str)]) -> SdkResult<Page<Transaction>> {
        self.send(self.client.get(self.api("/transactions")).query(query)).await
    }

    pub async fn approvals(&self, id: Uuid) -> SdkResult<Vec<Value>> {
        self.send(self.client.get(self.api(&format!("/transactions/{}/approvals", id)))).await
    }

    pub async fn approve(&self, id: Uuid, approver_id: &str, mfa_verified: bool) -> SdkResult<ApprovalResult> {
        let body = json!({ "approver_id": approver_id, "mfa_verified": mfa_verified });
        self.send(self.client.post(self.api(&format!("/transactions/{}/approve", id))).json(&body))
            .await
    }

    pub async fn reject(&self, id: Uuid, approver_id: &str, reason: &str) -> SdkResult<Transaction> {
        let body = json!({ "approver_id": approver_id, "reason": reason });
        self.send(self.client.post(self.api(&format!("/transactions/{}/reject", id))).json(&body))
            .await
    }

    pub async fn cancel(&self, id: Uuid, reason: Option<&str>) -> SdkResult<Transaction> {
        let body = json!({ "reason": reason });
        self.send(self.client.post(self.api(&format!("/transactions/{}/cancel", id))).json(&body))
            .await
    }

    pub async fn retry(&self, id: Uuid) -> SdkResult<Transaction> {
        self.send(self.client.post(self.api(&format!("/transactions/{}/retry", id)))).await
    }

    pub async fn complete(&self, id: Uuid, actual_fee: Option<u64>, tx_hash: Option<&str>) -> SdkResult<Transaction> {
        let body = json!({ "actual_fee": actual_fee.map(|f| f.to_string()), "tx_hash": tx_hash });
        self.send(self.client.post(self.api(&format!("/transactions/{}/complete", id))).json(&body))
            .await
    }

    pub async fn fail(&self, id: Uuid, error: &str) -> SdkResult<Transaction> {
        let body = json!({ "error": error });
        self.send(self.client.post(self.api(&format!("/transactions/{}/fail", id))).json(&body))
            .await
    }

    /// Replace a wallet's own policy; `rules` holds the policy fields.
    pub async fn set_wallet_policy(&self, wallet_id: Uuid, rules: &Value) -> SdkResult<Value> {
        self.send(self.client.put(self.api(&format!("/wallets/{}/policy", wallet_id))).json(rules))
            .await
    }

    pub async fn wallet_policy(&self, wallet_id: Uuid) -> SdkResult<Value> {
        self.send(self.client.get(self.api(&format!("/wallets/{}/policy", wallet_id)))).await
    }

    pub async fn create_batch(&self, name: &str, transactions: &[TransactionRequest]) -> SdkResult<Batch> {
        let body = json!({ "name": name, "transactions": transactions });
        self.send(self.client.post(self.api("/batches")).json(&body)).await
    }

    pub async fn get_batch(&self, id: Uuid) -> SdkResult<Batch> {
        self.send(self.client.get(self.api(&format!("/batches/{}", id)))).await
    }

    pub async fn approve_batch(&self, id: Uuid, approver_id: &str, mfa_verified: bool) -> SdkResult<Value> {
        let body = json!({ "approver_id": approver_id, "mfa_verified": mfa_verified });
        self.send(self.client.post(self.api(&format!("/batches/{}/approve", id))).json(&body))
            .await
    }

    pub async fn create_cold_request(&self, request: &Value) -> SdkResult<ColdStorageRequest> {
        self.send(self.client.post(self.api("/cold-storage/requests")).json(request)).await
    }

    pub async fn get_cold_request(&self, id: Uuid) -> SdkResult<ColdStorageRequest> {
        self.send(self.client.get(self.api(&format!("/cold-storage/requests/{}", id)))).await
    }

    pub async fn approve_cold(&self, id: Uuid, approver_id: &str, mfa_verified: bool) -> SdkResult<ColdApprovalResult> {
        let body = json!({ "approver_id": approver_id, "mfa_verified": mfa_verified });
        self.send(
            self.client
                .post(self.api(&format!("/cold-storage/requests/{}/approve", id)))
                .json(&body),
        )
        .await
    }

    pub async fn verify_cold(&self, id: Uuid, verifier_id: &str) -> SdkResult<ColdStorageRequest> {
        let body = json!({ "verifier_id": verifier_id });
        self.send(
            self.client
                .post(self.api(&format!("/cold-storage/requests/{}/verify", id)))
                .json(&body),
        )
        .await
    }

    pub async fn report_share(&self, share: &Value) -> SdkResult<Value> {
        self.send(self.client.put(self.api("/mpc/shares")).json(share)).await
    }

    pub async fn create_relationship(&self, parent: Uuid, child: Uuid) -> SdkResult<Value> {
        let body = json!({ "parent_wallet_id": parent, "child_wallet_id": child });
        self.send(self.client.post(self.api("/pools/relationships")).json(&body)).await
    }

    pub async fn create_transfer(&self, from: Uuid, to: Uuid, amount: u64, currency: &str) -> SdkResult<Value> {
        let body = json!({
            "from_wallet_id": from,
            "to_wallet_id": to,
            "amount": amount.to_string(),
            "currency": currency,
        });
        self.send(self.client.post(self.api("/pools/transfers")).json(&body)).await
    }

    pub async fn admin_stats(&self, api_key: &str) -> SdkResult<Value> {
        self.send(
            self.client
                .get(format!("{}/admin/stats", self.base_url))
                .bearer_auth(api_key),
        )
        .await
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> SdkResult<T> {
        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => SdkError::Api {
                    status: status.as_u16(),
                    body,
                },
                Err(_) => SdkError::Unexpected {
                    status: status.as_u16(),
                    text,
                },
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_url_uses_websocket_scheme() {
        let client = CustodyClient::new("http://127.0.0.1:8080/");
        assert_eq!(client.events_url(), "ws://127.0.0.1:8080/api/v1/events");
        let secure = CustodyClient::new("https://custody.example");
        assert_eq!(secure.events_url(), "wss://custody.example/api/v1/events");
    }
}
