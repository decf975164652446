use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use visit_cell::VisitError;

// ==============================================================================
// INVOICES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
    Overdue,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Pending,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Paid,
        InvoiceStatus::Cancelled,
        InvoiceStatus::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Cancelled => "CANCELLED",
            InvoiceStatus::Overdue => "OVERDUE",
        }
    }

    /// Still expecting money from the patient.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    MobileMoney,
    Insurance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemInput {
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub amount: f64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub received_by: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub branch_id: String,
    pub patient_id: Uuid,
    pub visit_id: Option<Uuid>,
    pub line_items: Vec<LineItem>,
    pub tax_rate: f64,
    pub discount: f64,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub insurance_provider_id: Option<Uuid>,
    pub insurance_coverage: f64,
    pub patient_responsibility: f64,
    pub amount_paid: f64,
    pub balance: f64,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub payments: Vec<Payment>,
    pub cancellation_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Money figures derived from line items, tax, discount and cover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub insurance_coverage: f64,
    pub patient_responsibility: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub patient_id: Uuid,
    pub visit_id: Option<Uuid>,
    pub line_items: Vec<LineItemInput>,
    /// Percent; falls back to the configured default.
    pub tax_rate: Option<f64>,
    pub discount: Option<f64>,
    /// Falls back to the patient's registered provider.
    pub insurance_provider_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: f64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelInvoiceRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceQuery {
    pub branch_id: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub patient_id: Option<Uuid>,
    pub visit_id: Option<Uuid>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ==============================================================================
// INSURANCE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceProvider {
    pub id: Uuid,
    pub name: String,
    pub coverage_percentage: f64,
    pub max_coverage_amount: Option<f64>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInsuranceProviderRequest {
    pub name: String,
    pub coverage_percentage: f64,
    pub max_coverage_amount: Option<f64>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInsuranceProviderRequest {
    pub name: Option<String>,
    pub coverage_percentage: Option<f64>,
    pub max_coverage_amount: Option<f64>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderListQuery {
    pub active_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimQuery {
    pub branch_id: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimSummary {
    pub provider_id: Uuid,
    pub provider_name: String,
    pub invoice_count: usize,
    pub total_billed: f64,
    pub total_covered: f64,
    pub patient_responsibility: f64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Invoice not found")]
    InvoiceNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Insurance provider not found")]
    ProviderNotFound,

    #[error("Insurance provider {0} is not active")]
    InactiveProvider(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Payment of {amount:.2} exceeds outstanding balance of {balance:.2}")]
    Overpayment { amount: f64, balance: f64 },

    #[error("Invoice is {0}")]
    InvoiceClosed(InvoiceStatus),

    #[error("Invoice cannot be cancelled: {0}")]
    CannotCancel(String),

    #[error("Invoice was updated by another user; reload and retry")]
    ConcurrentUpdate,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Visit(#[from] VisitError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<BillingError> for shared_models::error::AppError {
    fn from(err: BillingError) -> Self {
        use shared_models::error::AppError;

        match err {
            BillingError::Visit(inner) => inner.into(),
            other => {
                let message = other.to_string();
                match other {
                    BillingError::InvoiceNotFound
                    | BillingError::PatientNotFound
                    | BillingError::ProviderNotFound => AppError::NotFound(message),
                    BillingError::InvoiceClosed(_)
                    | BillingError::CannotCancel(_)
                    | BillingError::ConcurrentUpdate => AppError::Conflict(message),
                    BillingError::InactiveProvider(_)
                    | BillingError::InvalidAmount(_)
                    | BillingError::Overpayment { .. } => AppError::BadRequest(message),
                    BillingError::ValidationError(_) => AppError::ValidationError(message),
                    _ => AppError::Database(message),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use shared_models::error::AppError;

    #[test]
    fn statuses_use_wire_names() {
        assert_eq!(serde_json::to_value(InvoiceStatus::PartiallyPaid).unwrap(), "PARTIALLY_PAID");
        assert_eq!(InvoiceStatus::Overdue.to_string(), "OVERDUE");
        assert!(!InvoiceStatus::Cancelled.is_open());
    }

    #[test]
    fn error_statuses() {
        let overpay = BillingError::Overpayment { amount: 20.0, balance: 10.0 };
        assert_eq!(AppError::from(overpay).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(BillingError::InvoiceClosed(InvoiceStatus::Paid)).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(BillingError::InactiveProvider("Acme".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::from(BillingError::ProviderNotFound).status_code(), StatusCode::NOT_FOUND);
    }
}
