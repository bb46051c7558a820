use axum::extract::State;
use axum::Json;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_key, upstream_error};
use crate::api::{ApiJson, AppState};
use crate::auth::identity::CurrentUser;
use crate::error::ApiError;

const SERVICE: &str = "commerce";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

/// Inbound `/create-checkout-session` body. Both camelCase and snake_case
/// spellings of the price fields are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default, alias = "price_data")]
    price_data: Option<PriceDataBody>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceDataBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "unit_amount")]
    unit_amount: Option<i64>,
}

/// A validated checkout request: one line item, quantity one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub mode: CheckoutMode,
    pub product_name: String,
    pub unit_amount: i64,
    pub currency: String,
}

impl TryFrom<CheckoutBody> for CheckoutRequest {
    type Error = ApiError;

    fn try_from(body: CheckoutBody) -> Result<Self, Self::Error> {
        let mode = match body.mode.as_deref() {
            Some("payment") => CheckoutMode::Payment,
            Some("subscription") => CheckoutMode::Subscription,
            _ => {
                return Err(ApiError::InvalidRequest(
                    "Invalid mode. Use 'payment' or 'subscription'.".into(),
                ))
            }
        };

        let price = body.price_data.ok_or_else(|| {
            ApiError::InvalidRequest("Missing required price data (unitAmount, name).".into())
        })?;
        let product_name = price
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest("price data name is required".into()))?;
        let unit_amount = price
            .unit_amount
            .filter(|amount| *amount > 0)
            .ok_or_else(|| {
                ApiError::InvalidRequest("price data unitAmount must be a positive integer".into())
            })?;

        let currency = body
            .currency
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest("Missing required currency.".into()))?;

        Ok(Self {
            mode,
            product_name,
            unit_amount,
            currency,
        })
    }
}

impl CheckoutRequest {
    /// Bracketed form fields for the session-creation call.
    pub fn form_fields(&self, success_url: &str, cancel_url: &str) -> Vec<(String, String)> {
        let item = "line_items[0]";
        let mut fields = vec![
            ("payment_method_types[0]".to_string(), "card".to_string()),
            (format!("{item}[price_data][currency]"), self.currency.clone()),
            (
                format!("{item}[price_data][product_data][name]"),
                self.product_name.clone(),
            ),
            (
                format!("{item}[price_data][unit_amount]"),
                self.unit_amount.to_string(),
            ),
        ];
        if self.mode == CheckoutMode::Subscription {
            fields.push((
                format!("{item}[price_data][recurring][interval]"),
                "month".to_string(),
            ));
        }
        fields.extend([
            (format!("{item}[quantity]"), "1".to_string()),
            ("mode".to_string(), self.mode.as_str().to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
        ]);
        fields
    }
}

#[derive(Clone)]
pub struct CommerceGateway {
    client: Client,
    endpoint: String,
    secret_key: Option<String>,
    success_url: String,
    cancel_url: String,
}

impl CommerceGateway {
    pub fn new(
        client: Client,
        base_url: &str,
        secret_key: Option<String>,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/checkout/sessions", base_url.trim_end_matches('/')),
            secret_key,
            success_url,
            cancel_url,
        }
    }

    /// Create a hosted checkout session and return its `url` as given.
    pub async fn create_session(&self, request: &CheckoutRequest) -> Result<Value, ApiError> {
        let key = require_key(SERVICE, &self.secret_key)?;

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(key)
            .form(&request.form_fields(&self.success_url, &self.cancel_url))
            .send()
            .await
            .map_err(|e| ApiError::upstream_transport(SERVICE, e))?;

        if !resp.status().is_success() {
            return Err(upstream_error(SERVICE, resp).await);
        }

        let session: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::upstream_transport(SERVICE, e))?;
        Ok(session.get("url").cloned().unwrap_or(Value::Null))
    }
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<CheckoutBody>,
) -> Result<Json<Value>, ApiError> {
    let request = CheckoutRequest::try_from(body)?;
    tracing::info!(
        user = %user.id(),
        mode = request.mode.as_str(),
        amount = request.unit_amount,
        currency = %request.currency,
        "Creating checkout session"
    );

    let url = state.commerce.create_session(&request).await?;
    Ok(Json(json!({ "url": url })))
}
