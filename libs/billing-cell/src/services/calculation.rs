use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    BillingError, InsuranceProvider, Invoice, InvoiceStatus, InvoiceTotals, LineItem, LineItemInput,
    Payment, RecordPaymentRequest,
};

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn build_line_items(inputs: &[LineItemInput]) -> Result<Vec<LineItem>, BillingError> {
    if inputs.is_empty() {
        return Err(BillingError::ValidationError("An invoice needs at least one line item".to_string()));
    }

    inputs
        .iter()
        .map(|input| {
            if input.description.trim().is_empty() {
                return Err(BillingError::ValidationError("Line item description cannot be empty".to_string()));
            }
            if input.quantity == 0 {
                return Err(BillingError::InvalidAmount(format!("Quantity for '{}' must be positive", input.description)));
            }
            if !input.unit_price.is_finite() || input.unit_price <= 0.0 {
                return Err(BillingError::InvalidAmount(format!("Unit price for '{}' must be positive", input.description)));
            }

            Ok(LineItem {
                description: input.description.trim().to_string(),
                quantity: input.quantity,
                unit_price: round_cents(input.unit_price),
                total: round_cents(input.quantity as f64 * input.unit_price),
            })
        })
        .collect()
}

/// Coverage is a share of the total, capped by the provider's maximum.
pub fn insurance_coverage(total: f64, provider: Option<&InsuranceProvider>) -> f64 {
    let Some(provider) = provider else {
        return 0.0;
    };

    let share = total * provider.coverage_percentage / 100.0;
    let capped = match provider.max_coverage_amount {
        Some(max) => share.min(max),
        None => share,
    };
    round_cents(capped.max(0.0))
}

pub fn compute_totals(
    items: &[LineItem],
    tax_rate: f64,
    discount: f64,
    provider: Option<&InsuranceProvider>,
) -> Result<InvoiceTotals, BillingError> {
    if !(0.0..=100.0).contains(&tax_rate) {
        return Err(BillingError::ValidationError(format!("Tax rate {} must be between 0 and 100", tax_rate)));
    }
    if discount < 0.0 {
        return Err(BillingError::InvalidAmount("Discount cannot be negative".to_string()));
    }

    let subtotal = round_cents(items.iter().map(|item| item.total).sum());
    if discount > subtotal {
        return Err(BillingError::InvalidAmount(format!(
            "Discount {:.2} exceeds subtotal {:.2}",
            discount, subtotal
        )));
    }

    let taxable = subtotal - discount;
    let tax_amount = round_cents(taxable * tax_rate / 100.0);
    let total = round_cents(taxable + tax_amount);
    let insurance_coverage = insurance_coverage(total, provider);

    Ok(InvoiceTotals {
        subtotal,
        tax_amount,
        total,
        insurance_coverage,
        patient_responsibility: round_cents(total - insurance_coverage),
    })
}

/// CANCELLED sticks; otherwise the status follows the money and the due date.
pub fn derive_status(
    current: InvoiceStatus,
    balance: f64,
    amount_paid: f64,
    due_date: NaiveDate,
    today: NaiveDate,
) -> InvoiceStatus {
    if current == InvoiceStatus::Cancelled {
        InvoiceStatus::Cancelled
    } else if balance <= 0.0 {
        InvoiceStatus::Paid
    } else if amount_paid > 0.0 {
        InvoiceStatus::PartiallyPaid
    } else if today > due_date {
        InvoiceStatus::Overdue
    } else {
        InvoiceStatus::Pending
    }
}

pub fn refresh_status(invoice: &mut Invoice, today: NaiveDate) {
    invoice.status = derive_status(
        invoice.status,
        invoice.balance,
        invoice.amount_paid,
        invoice.due_date,
        today,
    );
}

/// Appends the payment and recomputes balance and status.
pub fn apply_payment(
    invoice: &mut Invoice,
    request: &RecordPaymentRequest,
    received_by: &str,
    now: DateTime<Utc>,
) -> Result<Payment, BillingError> {
    refresh_status(invoice, now.date_naive());
    if matches!(invoice.status, InvoiceStatus::Cancelled | InvoiceStatus::Paid) {
        return Err(BillingError::InvoiceClosed(invoice.status));
    }

    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(BillingError::InvalidAmount("Payment amount must be positive".to_string()));
    }
    let amount = round_cents(request.amount);
    if amount > invoice.balance {
        return Err(BillingError::Overpayment { amount, balance: invoice.balance });
    }

    let payment = Payment {
        id: Uuid::new_v4(),
        amount,
        method: request.method,
        reference: request.reference.clone(),
        received_by: received_by.to_string(),
        received_at: now,
    };

    invoice.payments.push(payment.clone());
    invoice.amount_paid = round_cents(invoice.amount_paid + amount);
    invoice.balance = round_cents(invoice.patient_responsibility - invoice.amount_paid);
    invoice.updated_at = now;
    refresh_status(invoice, now.date_naive());

    Ok(payment)
}

pub fn apply_cancel(invoice: &mut Invoice, reason: &str, now: DateTime<Utc>) -> Result<(), BillingError> {
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(BillingError::InvoiceClosed(InvoiceStatus::Cancelled));
    }
    if invoice.amount_paid > 0.0 {
        return Err(BillingError::CannotCancel(format!(
            "{:.2} has already been paid",
            invoice.amount_paid
        )));
    }
    if reason.trim().is_empty() {
        return Err(BillingError::ValidationError("A cancellation reason is required".to_string()));
    }

    invoice.status = InvoiceStatus::Cancelled;
    invoice.cancellation_reason = Some(reason.trim().to_string());
    invoice.updated_at = now;
    Ok(())
}
