//! Payment processor trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

/// One line of a hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub description: String,
    /// Unit amount in minor currency units.
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Everything the processor needs to create a hosted payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSessionRequest {
    pub line_items: Vec<LineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Opaque key/value data round-tripped verbatim by the processor.
    pub metadata: HashMap<String, String>,
    pub customer_email: Option<String>,
}

/// A session created by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub id: String,
    /// Hosted page the customer is redirected to.
    pub url: String,
}

/// Payment status of a session as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::NoPaymentRequired => "no_payment_required",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session as read back from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: String,
    pub payment_status: PaymentStatus,
    /// Total charged, in minor currency units.
    pub amount_total: i64,
    pub metadata: HashMap<String, String>,
}

/// Trait for hosted payment processors.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a hosted payment session.
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, PaymentError>;

    /// Reads a session back by ID.
    async fn retrieve_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    sessions: HashMap<String, (CreateSessionRequest, PaymentSession)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_retrieve: Option<PaymentError>,
    create_calls: usize,
    retrieve_calls: usize,
}

/// In-memory payment processor for testing and local runs.
///
/// Sessions start unpaid; [`mark_paid`](Self::mark_paid) simulates the
/// customer completing the hosted page.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProcessor {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentProcessor {
    /// Creates a new in-memory payment processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the processor to reject session creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the processor to fail every retrieve with the given error.
    pub fn set_fail_on_retrieve(&self, error: Option<PaymentError>) {
        self.state.write().unwrap().fail_on_retrieve = error;
    }

    /// Marks a session as paid. Returns false if the session is unknown.
    pub fn mark_paid(&self, session_id: &str) -> bool {
        self.set_status(session_id, PaymentStatus::Paid)
    }

    /// Sets the payment status of a session. Returns false if unknown.
    pub fn set_status(&self, session_id: &str, status: PaymentStatus) -> bool {
        let mut state = self.state.write().unwrap();
        match state.sessions.get_mut(session_id) {
            Some((_, session)) => {
                session.payment_status = status;
                true
            }
            None => false,
        }
    }

    /// Registers a session directly, bypassing creation.
    pub fn insert_session(&self, session: PaymentSession) {
        let request = CreateSessionRequest {
            line_items: Vec::new(),
            currency: "usd".to_string(),
            success_url: String::new(),
            cancel_url: String::new(),
            metadata: session.metadata.clone(),
            customer_email: None,
        };
        self.state
            .write()
            .unwrap()
            .sessions
            .insert(session.id.clone(), (request, session));
    }

    /// Returns the request a session was created from.
    pub fn session_request(&self, session_id: &str) -> Option<CreateSessionRequest> {
        self.state
            .read()
            .unwrap()
            .sessions
            .get(session_id)
            .map(|(request, _)| request.clone())
    }

    /// Returns the number of create calls made.
    pub fn create_calls(&self) -> usize {
        self.state.read().unwrap().create_calls
    }

    /// Returns the number of retrieve calls made.
    pub fn retrieve_calls(&self) -> usize {
        self.state.read().unwrap().retrieve_calls
    }

    /// Returns the number of sessions created.
    pub fn session_count(&self) -> usize {
        self.state.read().unwrap().sessions.len()
    }
}

#[async_trait]
impl PaymentProcessor for InMemoryPaymentProcessor {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, PaymentError> {
        let mut state = self.state.write().unwrap();
        state.create_calls += 1;

        if state.fail_on_create {
            return Err(PaymentError::Rejected {
                status: 400,
                message: "Session rejected".to_string(),
            });
        }

        state.next_id += 1;
        let id = format!("cs_test_{:04}", state.next_id);
        let amount_total = request
            .line_items
            .iter()
            .map(|line| line.unit_amount * i64::from(line.quantity))
            .sum();
        let session = PaymentSession {
            id: id.clone(),
            payment_status: PaymentStatus::Unpaid,
            amount_total,
            metadata: request.metadata.clone(),
        };
        state.sessions.insert(id.clone(), (request, session));

        Ok(CreatedSession {
            url: format!("https://checkout.test/pay/{id}"),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError> {
        let mut state = self.state.write().unwrap();
        state.retrieve_calls += 1;

        if let Some(error) = &state.fail_on_retrieve {
            return Err(error.clone());
        }

        state
            .sessions
            .get(session_id)
            .map(|(_, session)| session.clone())
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))
    }
}
