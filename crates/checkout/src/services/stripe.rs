//! Stripe Checkout client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PaymentError;
use crate::services::payment::{
    CreateSessionRequest, CreatedSession, PaymentProcessor, PaymentSession, PaymentStatus,
};

/// Default Stripe API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Connection settings for the Stripe API.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Payment processor backed by Stripe Checkout sessions.
#[derive(Debug, Clone)]
pub struct StripePaymentProcessor {
    config: StripeConfig,
    api_base: reqwest::Url,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripePaymentProcessor {
    /// Builds a client with the configured timeout.
    ///
    /// Fails if `api_base` is not an absolute URL that can carry a path.
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let api_base = reqwest::Url::parse(&config.api_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                PaymentError::Unavailable(format!("invalid API base URL '{}'", config.api_base))
            })?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            api_base,
            client,
        })
    }

    /// Appends path segments to the API base, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, PaymentError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| PaymentError::Unavailable("API base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_session(response: reqwest::Response) -> Result<SessionResponse, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<SessionResponse>()
                .await
                .map_err(|e| PaymentError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(body);

        tracing::warn!(status = status.as_u16(), %message, "Stripe API error");
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(PaymentError::Unavailable(message))
        } else {
            Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn transport_error(e: reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        PaymentError::Timeout(e.to_string())
    } else {
        PaymentError::Unavailable(e.to_string())
    }
}

fn parse_status(raw: Option<&str>) -> Result<PaymentStatus, PaymentError> {
    match raw {
        Some("paid") => Ok(PaymentStatus::Paid),
        Some("unpaid") => Ok(PaymentStatus::Unpaid),
        Some("no_payment_required") => Ok(PaymentStatus::NoPaymentRequired),
        Some(other) => Err(PaymentError::InvalidResponse(format!(
            "unknown payment_status '{other}'"
        ))),
        None => Err(PaymentError::InvalidResponse(
            "missing payment_status".to_string(),
        )),
    }
}

fn payment_session(session: SessionResponse) -> Result<PaymentSession, PaymentError> {
    let payment_status = parse_status(session.payment_status.as_deref())?;
    let amount_total = session.amount_total.ok_or_else(|| {
        PaymentError::InvalidResponse(format!("session {} has no amount_total", session.id))
    })?;

    Ok(PaymentSession {
        id: session.id,
        payment_status,
        amount_total,
        metadata: session.metadata,
    })
}

/// Flattens a session request into Stripe's bracketed form parameters.
pub(crate) fn form_params(request: &CreateSessionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    if let Some(email) = &request.customer_email {
        params.push(("customer_email".to_string(), email.clone()));
    }

    for (i, line) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        params.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            line.description.clone(),
        ));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            line.unit_amount.to_string(),
        ));
        params.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
    }

    let mut metadata: Vec<_> = request.metadata.iter().collect();
    metadata.sort();
    for (key, value) in metadata {
        params.push((format!("metadata[{key}]"), value.clone()));
    }

    params
}

#[async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    #[tracing::instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, PaymentError> {
        let response = self
            .client
            .post(self.endpoint(&["v1", "checkout", "sessions"])?)
            .bearer_auth(&self.config.secret_key)
            .form(&form_params(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let session = Self::read_session(response).await?;
        let url = session.url.ok_or_else(|| {
            PaymentError::InvalidResponse(format!("session {} has no url", session.id))
        })?;

        Ok(CreatedSession {
            id: session.id,
            url,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError> {
        let response = self
            .client
            .get(self.endpoint(&["v1", "checkout", "sessions", session_id])?)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::SessionNotFound(session_id.to_string()));
        }

        let session = Self::read_session(response).await?;
        payment_session(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment::LineItem;

    #[test]
    fn form_params_use_bracket_notation() {
        let request = CreateSessionRequest {
            line_items: vec![LineItem {
                description: "Kurta (fabric F-7)".to_string(),
                unit_amount: 3500,
                quantity: 1,
            }],
            currency: "usd".to_string(),
            success_url: "https://shop.test/checkout/success?session_id={CHECKOUT_SESSION_ID}"
                .to_string(),
            cancel_url: "https://shop.test/bag".to_string(),
            metadata: HashMap::from([
                ("tailor_id".to_string(), "t".to_string()),
                ("bag_id".to_string(), "b".to_string()),
            ]),
            customer_email: Some("ada@example.com".to_string()),
        };

        let params = form_params(&request);
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("customer_email"), Some("ada@example.com"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(
            get("line_items[0][price_data][product_data][name]"),
            Some("Kurta (fabric F-7)")
        );
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("3500"));
        assert_eq!(get("line_items[0][quantity]"), Some("1"));

        let metadata_keys: Vec<&str> = params
            .iter()
            .filter(|(k, _)| k.starts_with("metadata["))
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(metadata_keys, vec!["metadata[bag_id]", "metadata[tailor_id]"]);
    }

    #[test]
    fn payment_status_parsing() {
        assert_eq!(parse_status(Some("paid")), Ok(PaymentStatus::Paid));
        assert_eq!(parse_status(Some("unpaid")), Ok(PaymentStatus::Unpaid));
        assert!(parse_status(Some("refunded")).is_err());
        assert!(parse_status(None).is_err());
    }

    fn config(api_base: &str) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_secret".to_string(),
            api_base: api_base.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    fn response(amount_total: Option<i64>) -> SessionResponse {
        SessionResponse {
            id: "cs_test_1".to_string(),
            url: None,
            payment_status: Some("paid".to_string()),
            amount_total,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn debug_output_redacts_secret() {
        assert!(!format!("{:?}", config(DEFAULT_API_BASE)).contains("sk_test_secret"));
    }

    #[test]
    fn session_id_stays_inside_its_path_segment() {
        let processor = StripePaymentProcessor::new(config(DEFAULT_API_BASE)).unwrap();
        let hostile = "../../customers/cus_123?expand[]=sources";

        let url = processor
            .endpoint(&["v1", "checkout", "sessions", hostile])
            .unwrap();

        assert_eq!(url.host_str(), Some("api.stripe.com"));
        assert!(url.path().starts_with("/v1/checkout/sessions/"));
        assert_eq!(url.path_segments().unwrap().count(), 4);
        assert!(url.query().is_none());
        assert!(!url.path().contains("/customers"));
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let processor = StripePaymentProcessor::new(config("http://127.0.0.1:12111/")).unwrap();
        let url = processor.endpoint(&["v1", "checkout", "sessions"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:12111/v1/checkout/sessions");
    }

    #[test]
    fn rejects_unusable_api_base() {
        assert!(StripePaymentProcessor::new(config("not a url")).is_err());
        assert!(StripePaymentProcessor::new(config("mailto:billing@example.com")).is_err());
    }

    #[test]
    fn paid_session_without_amount_is_invalid() {
        let err = payment_session(response(None)).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidResponse(ref m) if m.contains("amount_total")));

        let session = payment_session(response(Some(7000))).unwrap();
        assert_eq!(session.amount_total, 7000);
        assert_eq!(session.payment_status, PaymentStatus::Paid);
    }
}
