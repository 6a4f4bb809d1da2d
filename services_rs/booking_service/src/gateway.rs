//! Client for the hosted-checkout payment gateway (REST v1 payments API).
//!
//! Flow: fetch an OAuth2 client-credentials token, create a payment with return and
//! cancel URLs, send the buyer to the `approval_url` link, then execute the payment
//! with the payer id the gateway appends to the return URL.

use crate::error::ApiError;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayMode {
    Sandbox,
    Live,
}

impl GatewayMode {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct OrderRequest<'a> {
    pub booking_id: &'a str,
    pub description: String,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: String,
    pub approval_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Approved,
    /// The gateway refused the execution (not approved by the payer, already done, ...).
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
pub struct RemotePayment {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

/// "1250" cents -> "12.50", the decimal string format the gateway expects.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn transport_error(op: &str, e: reqwest::Error) -> ApiError {
    tracing::error!(error = %e, op, "payment gateway http error");
    ApiError::upstream("payment gateway unavailable")
}

async fn access_token(http: &Client, cfg: &GatewayConfig) -> Result<String, ApiError> {
    let resp = http
        .post(format!("{}/v1/oauth2/token", cfg.base_url))
        .basic_auth(&cfg.client_id, Some(&cfg.client_secret))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("grant_type=client_credentials")
        .send()
        .await
        .map_err(|e| transport_error("token", e))?;
    let status = resp.status();
    if !status.is_success() {
        tracing::error!(status = status.as_u16(), "payment gateway token request rejected");
        return Err(ApiError::upstream("payment gateway authentication failed"));
    }
    let token: TokenResponse = resp.json().await.map_err(|e| transport_error("token", e))?;
    Ok(token.access_token)
}

pub async fn create_payment(
    http: &Client,
    cfg: &GatewayConfig,
    order: &OrderRequest<'_>,
) -> Result<CreatedOrder, ApiError> {
    let token = access_token(http, cfg).await?;
    let total = format_amount(order.amount_cents);
    let body = json!({
        "intent": "sale",
        "payer": { "payment_method": "paypal" },
        "redirect_urls": {
            "return_url": order.return_url,
            "cancel_url": order.cancel_url,
        },
        "transactions": [{
            "item_list": {
                "items": [{
                    "name": "Bus ticket",
                    "sku": order.booking_id,
                    "price": total,
                    "currency": order.currency,
                    "quantity": 1,
                }]
            },
            "amount": { "total": total, "currency": order.currency },
            "description": order.description,
            "invoice_number": order.booking_id,
        }],
    });

    let resp = http
        .post(format!("{}/v1/payments/payment", cfg.base_url))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .map_err(|e| transport_error("create", e))?;
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        let detail = serde_json::from_str::<GatewayErrorBody>(&text)
            .map(|b| format!("{}: {}", b.name, b.message))
            .unwrap_or_else(|_| status.to_string());
        tracing::error!(status = status.as_u16(), detail = %detail, "payment gateway create rejected");
        return Err(ApiError::upstream("payment could not be created"));
    }

    let payment: RemotePayment = serde_json::from_str(&text).map_err(|e| {
        tracing::error!(error = %e, "payment gateway create returned invalid json");
        ApiError::upstream("payment could not be created")
    })?;
    let approval_url = payment
        .links
        .iter()
        .find(|l| l.rel == "approval_url")
        .map(|l| l.href.clone())
        .ok_or_else(|| {
            tracing::error!(order_id = %payment.id, "payment gateway returned no approval_url");
            ApiError::upstream("payment could not be created")
        })?;

    Ok(CreatedOrder {
        order_id: payment.id,
        approval_url,
    })
}

pub async fn find_payment(
    http: &Client,
    cfg: &GatewayConfig,
    order_id: &str,
) -> Result<RemotePayment, ApiError> {
    let token = access_token(http, cfg).await?;
    let resp = http
        .get(format!("{}/v1/payments/payment/{order_id}", cfg.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .map_err(|e| transport_error("find", e))?;
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ApiError::not_found("payment not found at gateway"));
    }
    if !status.is_success() {
        tracing::error!(status = status.as_u16(), order_id, "payment gateway lookup failed");
        return Err(ApiError::upstream("payment gateway lookup failed"));
    }
    resp.json().await.map_err(|e| transport_error("find", e))
}

pub async fn execute_payment(
    http: &Client,
    cfg: &GatewayConfig,
    order_id: &str,
    payer_id: &str,
) -> Result<ExecuteOutcome, ApiError> {
    let token = access_token(http, cfg).await?;
    let resp = http
        .post(format!(
            "{}/v1/payments/payment/{order_id}/execute",
            cfg.base_url
        ))
        .bearer_auth(&token)
        .json(&json!({ "payer_id": payer_id }))
        .send()
        .await
        .map_err(|e| transport_error("execute", e))?;
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();

    if status.is_client_error() {
        let reason = serde_json::from_str::<GatewayErrorBody>(&text)
            .map(|b| b.name)
            .ok()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| status.to_string());
        return Ok(ExecuteOutcome::Rejected(reason));
    }
    if !status.is_success() {
        tracing::error!(status = status.as_u16(), order_id, "payment gateway execute failed");
        return Err(ApiError::upstream("payment gateway unavailable"));
    }

    let payment: RemotePayment = serde_json::from_str(&text).map_err(|e| {
        tracing::error!(error = %e, "payment gateway execute returned invalid json");
        ApiError::upstream("payment gateway unavailable")
    })?;
    if payment.state == "approved" {
        Ok(ExecuteOutcome::Approved)
    } else {
        Ok(ExecuteOutcome::Rejected(payment.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_stub_server;

    fn cfg(base_url: &str) -> GatewayConfig {
        GatewayConfig {
            mode: GatewayMode::Sandbox,
            base_url: base_url.to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        }
    }

    fn token_response() -> (&'static str, String) {
        (
            "200 OK",
            r#"{"access_token":"tok-1","token_type":"Bearer","expires_in":32400}"#.to_string(),
        )
    }

    #[test]
    fn amounts_are_formatted_with_two_decimals() {
        assert_eq!(format_amount(1250), "12.50");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(100_000), "1000.00");
        assert_eq!(format_amount(-250), "-2.50");
    }

    #[tokio::test]
    async fn create_payment_sends_single_line_item_and_returns_approval_link() {
        let (base, mut rx) = spawn_stub_server(vec![
            token_response(),
            (
                "201 Created",
                r#"{"id":"PAYID-123","state":"created","links":[
                    {"href":"https://gw.test/v1/payments/payment/PAYID-123","rel":"self","method":"GET"},
                    {"href":"https://gw.test/checkout?token=EC-9","rel":"approval_url","method":"REDIRECT"}
                ]}"#
                .to_string(),
            ),
        ])
        .await;
        let http = Client::new();
        let order = OrderRequest {
            booking_id: "b-1",
            description: "Pune to Mumbai, 2 seat(s) on 2026-11-01".to_string(),
            amount_cents: 2450,
            currency: "USD",
            return_url: "http://tickets.test/payments/success".to_string(),
            cancel_url: "http://tickets.test/payments/cancel".to_string(),
        };

        let created = create_payment(&http, &cfg(&base), &order).await.expect("created");
        assert_eq!(created.order_id, "PAYID-123");
        assert_eq!(created.approval_url, "https://gw.test/checkout?token=EC-9");

        let token_req = rx.recv().await.expect("token request");
        assert_eq!(token_req.method, "POST");
        assert_eq!(token_req.path, "/v1/oauth2/token");
        assert!(token_req
            .header("authorization")
            .unwrap_or_default()
            .starts_with("Basic "));
        assert_eq!(token_req.body, "grant_type=client_credentials");

        let create_req = rx.recv().await.expect("create request");
        assert_eq!(create_req.path, "/v1/payments/payment");
        assert_eq!(create_req.header("authorization"), Some("Bearer tok-1"));
        let body = create_req.json();
        let tx = &body["transactions"][0];
        assert_eq!(tx["amount"]["total"], "24.50");
        assert_eq!(tx["amount"]["currency"], "USD");
        let items = tx["item_list"]["items"].as_array().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["quantity"], 1);
        assert_eq!(items[0]["sku"], "b-1");
        assert_eq!(
            body["redirect_urls"]["return_url"],
            "http://tickets.test/payments/success"
        );
    }

    #[tokio::test]
    async fn create_payment_without_approval_link_is_upstream_error() {
        let (base, _rx) = spawn_stub_server(vec![
            token_response(),
            ("201 Created", r#"{"id":"PAYID-1","state":"created","links":[]}"#.to_string()),
        ])
        .await;
        let order = OrderRequest {
            booking_id: "b-1",
            description: "x".to_string(),
            amount_cents: 100,
            currency: "USD",
            return_url: "r".to_string(),
            cancel_url: "c".to_string(),
        };
        let err = create_payment(&Client::new(), &cfg(&base), &order)
            .await
            .expect_err("no approval link");
        assert_eq!(err.status, axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn rejected_token_request_fails_before_creating() {
        let (base, mut rx) = spawn_stub_server(vec![(
            "401 Unauthorized",
            r#"{"error":"invalid_client"}"#.to_string(),
        )])
        .await;
        let err = find_payment(&Client::new(), &cfg(&base), "PAYID-1")
            .await
            .expect_err("bad credentials");
        assert_eq!(err.status, axum::http::StatusCode::BAD_GATEWAY);
        assert_eq!(rx.recv().await.expect("token").path, "/v1/oauth2/token");
    }

    #[tokio::test]
    async fn execute_reports_approval() {
        let (base, mut rx) = spawn_stub_server(vec![
            token_response(),
            ("200 OK", r#"{"id":"PAYID-7","state":"approved"}"#.to_string()),
        ])
        .await;
        let out = execute_payment(&Client::new(), &cfg(&base), "PAYID-7", "PAYER-1")
            .await
            .expect("executed");
        assert_eq!(out, ExecuteOutcome::Approved);

        let _token = rx.recv().await;
        let exec = rx.recv().await.expect("execute request");
        assert_eq!(exec.path, "/v1/payments/payment/PAYID-7/execute");
        assert_eq!(exec.json()["payer_id"], "PAYER-1");
    }

    #[tokio::test]
    async fn execute_client_error_is_a_rejection_not_a_failure() {
        let (base, _rx) = spawn_stub_server(vec![
            token_response(),
            (
                "400 Bad Request",
                r#"{"name":"PAYMENT_NOT_APPROVED_FOR_EXECUTION","message":"Payer has not approved payment"}"#
                    .to_string(),
            ),
        ])
        .await;
        let out = execute_payment(&Client::new(), &cfg(&base), "PAYID-7", "PAYER-1")
            .await
            .expect("outcome");
        assert_eq!(
            out,
            ExecuteOutcome::Rejected("PAYMENT_NOT_APPROVED_FOR_EXECUTION".to_string())
        );
    }

    #[tokio::test]
    async fn find_returns_remote_state() {
        let (base, _rx) = spawn_stub_server(vec![
            token_response(),
            ("200 OK", r#"{"id":"PAYID-7","state":"approved"}"#.to_string()),
        ])
        .await;
        let remote = find_payment(&Client::new(), &cfg(&base), "PAYID-7")
            .await
            .expect("found");
        assert_eq!(remote.id, "PAYID-7");
        assert_eq!(remote.state, "approved");
    }
}
