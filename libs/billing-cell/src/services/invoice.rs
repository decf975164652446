use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::{DateTime, Days, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::filters::RestQuery;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_utils::identifiers::invoice_number;
use shared_utils::scope::BranchScope;
use visit_cell::VisitService;

use crate::models::{
    BillingError, ClaimQuery, ClaimSummary, CreateInvoiceRequest, Invoice, InvoiceQuery, InvoiceStatus,
    Payment, RecordPaymentRequest,
};
use crate::services::calculation::{apply_cancel, apply_payment, build_line_items, compute_totals, refresh_status};
use crate::services::claims::summarize_claims;
use crate::services::insurance::InsuranceService;

const INVOICES_TABLE: &str = "invoices";
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

fn default_due_date(now: DateTime<Utc>, due_days: i64) -> Result<NaiveDate, BillingError> {
    u64::try_from(due_days)
        .ok()
        .and_then(|days| now.date_naive().checked_add_days(Days::new(days)))
        .ok_or_else(|| BillingError::ValidationError(format!("Invoice due period of {} days is out of range", due_days)))
}

pub struct InvoiceService {
    supabase: Arc<SupabaseClient>,
    insurance: InsuranceService,
    default_tax_rate: f64,
    due_days: i64,
}

impl InvoiceService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            insurance: InsuranceService::with_client(Arc::clone(&supabase)),
            supabase,
            default_tax_rate: config.default_tax_rate,
            due_days: config.invoice_due_days,
        }
    }

    /// Rows come back with the stored status; OVERDUE is re-derived on read.
    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Invoice>, BillingError> {
        let today = Utc::now().date_naive();
        rows.into_iter()
            .map(|row| {
                let mut invoice: Invoice = serde_json::from_value(row)
                    .map_err(|e| BillingError::DatabaseError(format!("Failed to parse invoice: {}", e)))?;
                refresh_status(&mut invoice, today);
                Ok(invoice)
            })
            .collect()
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<Value>, BillingError> {
        let rows: AnyResult<Vec<Value>> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await;
        rows.map_err(|e| BillingError::DatabaseError(e.to_string()))
    }

    // ==============================================================================
    // INVOICES
    // ==============================================================================

    pub async fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
        visits: &VisitService,
        user: &User,
        branch_id: &str,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        let line_items = build_line_items(&request.line_items)?;

        let patient_path = RestQuery::table("patients")
            .eq("id", request.patient_id)
            .eq("branch_id", branch_id)
            .limit(1)
            .build();
        let patient = self
            .fetch(&patient_path, auth_token)
            .await?
            .into_iter()
            .next()
            .ok_or(BillingError::PatientNotFound)?;

        let scope = BranchScope::Branch(branch_id.to_string());
        if let Some(visit_id) = request.visit_id {
            let visit = visits.get_visit(visit_id, &scope, auth_token).await?;
            if visit.patient_id != request.patient_id {
                return Err(BillingError::ValidationError(format!(
                    "Visit {} belongs to a different patient",
                    visit.visit_number
                )));
            }
        }

        let provider_id = request.insurance_provider_id.or_else(|| {
            patient
                .get("insurance_provider_id")
                .and_then(Value::as_str)
                .and_then(|id| Uuid::parse_str(id).ok())
        });
        let provider = match provider_id {
            Some(id) => {
                let provider = self.insurance.get_provider(id, auth_token).await?;
                if !provider.is_active {
                    return Err(BillingError::InactiveProvider(provider.name));
                }
                Some(provider)
            }
            None => None,
        };

        let tax_rate = request.tax_rate.unwrap_or(self.default_tax_rate);
        let discount = request.discount.unwrap_or(0.0);
        let totals = compute_totals(&line_items, tax_rate, discount, provider.as_ref())?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let due_date = match request.due_date {
            Some(date) => date,
            None => default_due_date(now, self.due_days)?,
        };

        let mut invoice = Invoice {
            id,
            invoice_number: invoice_number(now, id),
            branch_id: branch_id.to_string(),
            patient_id: request.patient_id,
            visit_id: request.visit_id,
            line_items,
            tax_rate,
            discount,
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            total: totals.total,
            insurance_provider_id: provider.as_ref().map(|p| p.id),
            insurance_coverage: totals.insurance_coverage,
            patient_responsibility: totals.patient_responsibility,
            amount_paid: 0.0,
            balance: totals.patient_responsibility,
            status: InvoiceStatus::Pending,
            due_date,
            payments: Vec::new(),
            cancellation_reason: None,
            created_by: user.id.clone(),
            created_at: now,
            updated_at: now,
        };
        refresh_status(&mut invoice, now.date_naive());

        let body = serde_json::to_value(&invoice)
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        let rows = self.supabase
            .request_returning(Method::POST, &RestQuery::table(INVOICES_TABLE).build(), Some(auth_token), body)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        let created = Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| BillingError::DatabaseError("Failed to create invoice".to_string()))?;

        info!(
            "Invoice {} raised for patient {}: total {:.2}, patient owes {:.2}",
            created.invoice_number, created.patient_id, created.total, created.patient_responsibility
        );

        if let Some(visit_id) = created.visit_id {
            if let Err(e) = visits
                .attach_invoice(visit_id, created.id, created.patient_responsibility, &scope, auth_token)
                .await
            {
                warn!("Invoice {} raised but visit {} not linked: {}", created.invoice_number, visit_id, e);
            }
        }

        Ok(created)
    }

    pub async fn get_invoice(
        &self,
        invoice_id: Uuid,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        let path = RestQuery::table(INVOICES_TABLE)
            .eq("id", invoice_id)
            .eq_opt("branch_id", scope.branch_id())
            .limit(1)
            .build();

        Self::parse_rows(self.fetch(&path, auth_token).await?)?
            .into_iter()
            .next()
            .ok_or(BillingError::InvoiceNotFound)
    }

    pub async fn list_invoices(
        &self,
        query: &InvoiceQuery,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Vec<Invoice>, BillingError> {
        let mut rest = RestQuery::table(INVOICES_TABLE)
            .eq_opt("branch_id", scope.branch_id())
            .eq_opt("patient_id", query.patient_id)
            .eq_opt("visit_id", query.visit_id);

        // PENDING and OVERDUE are the same stored row state until derivation.
        rest = match query.status {
            Some(InvoiceStatus::Pending) | Some(InvoiceStatus::Overdue) => rest.in_list(
                "status",
                &[InvoiceStatus::Pending.to_string(), InvoiceStatus::Overdue.to_string()],
            ),
            Some(status) => rest.eq("status", status),
            None => rest,
        };
        if let Some(from) = query.from_date {
            rest = rest.gte("created_at", from);
        }
        if let Some(to) = query.to_date {
            rest = rest.lt("created_at", to);
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let path = rest
            .order("created_at.desc")
            .limit(limit)
            .offset(query.offset.unwrap_or(0).max(0))
            .build();

        let invoices = Self::parse_rows(self.fetch(&path, auth_token).await?)?;
        Ok(match query.status {
            Some(status) => invoices.into_iter().filter(|i| i.status == status).collect(),
            None => invoices,
        })
    }

    /// Invoices still owed plus any touched since `since`, for dashboards.
    pub async fn invoices_for_dashboard(
        &self,
        scope: &BranchScope,
        since: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Invoice>, BillingError> {
        let open_path = RestQuery::table(INVOICES_TABLE)
            .eq_opt("branch_id", scope.branch_id())
            .in_list(
                "status",
                &[
                    InvoiceStatus::Pending.to_string(),
                    InvoiceStatus::PartiallyPaid.to_string(),
                    InvoiceStatus::Overdue.to_string(),
                ],
            )
            .build();
        let recent_path = RestQuery::table(INVOICES_TABLE)
            .eq_opt("branch_id", scope.branch_id())
            .gte("updated_at", since)
            .build();

        let mut invoices = Self::parse_rows(self.fetch(&open_path, auth_token).await?)?;
        for invoice in Self::parse_rows(self.fetch(&recent_path, auth_token).await?)? {
            if !invoices.iter().any(|i| i.id == invoice.id) {
                invoices.push(invoice);
            }
        }
        Ok(invoices)
    }

    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        request: RecordPaymentRequest,
        user: &User,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<(Invoice, Payment), BillingError> {
        let mut invoice = self.get_invoice(invoice_id, scope, auth_token).await?;
        let paid_before = invoice.amount_paid;

        let payment = apply_payment(&mut invoice, &request, &user.id, Utc::now())?;
        let saved = self.persist(&invoice, paid_before, auth_token).await?;

        info!(
            "Payment of {:.2} recorded on invoice {}; balance {:.2} ({})",
            payment.amount, saved.invoice_number, saved.balance, saved.status
        );
        Ok((saved, payment))
    }

    pub async fn cancel_invoice(
        &self,
        invoice_id: Uuid,
        reason: &str,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        let mut invoice = self.get_invoice(invoice_id, scope, auth_token).await?;
        let paid_before = invoice.amount_paid;

        apply_cancel(&mut invoice, reason, Utc::now())?;
        let saved = self.persist(&invoice, paid_before, auth_token).await?;

        info!("Invoice {} cancelled", saved.invoice_number);
        Ok(saved)
    }

    pub async fn claim_summary(
        &self,
        query: &ClaimQuery,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Vec<ClaimSummary>, BillingError> {
        let mut rest = RestQuery::table(INVOICES_TABLE)
            .eq_opt("branch_id", scope.branch_id())
            .not_null("insurance_provider_id")
            .neq("status", InvoiceStatus::Cancelled);
        if let Some(from) = query.from_date {
            rest = rest.gte("created_at", from);
        }
        if let Some(to) = query.to_date {
            rest = rest.lt("created_at", to);
        }

        let invoices = Self::parse_rows(self.fetch(&rest.build(), auth_token).await?)?;
        let providers = self.insurance.list_providers(false, auth_token).await?;
        debug!("Summarizing claims across {} insured invoices", invoices.len());

        Ok(summarize_claims(&invoices, &providers))
    }

    /// PATCH guarded on the amount paid the caller read, so two cashiers cannot both settle a balance.
    async fn persist(&self, invoice: &Invoice, paid_before: f64, auth_token: &str) -> Result<Invoice, BillingError> {
        let path = RestQuery::table(INVOICES_TABLE)
            .eq("id", invoice.id)
            .eq("amount_paid", paid_before)
            .build();

        let body = json!({
            "amount_paid": invoice.amount_paid,
            "balance": invoice.balance,
            "status": invoice.status,
            "payments": invoice.payments,
            "cancellation_reason": invoice.cancellation_reason,
            "updated_at": invoice.updated_at,
        });

        let rows = self.supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), body)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        match Self::parse_rows(rows)?.into_iter().next() {
            Some(saved) => Ok(saved),
            None => {
                warn!("Invoice {} changed underneath this update", invoice.invoice_number);
                Err(BillingError::ConcurrentUpdate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    #[test]
    fn due_date_counts_whole_days() {
        let now = Utc.with_ymd_and_hms(2026, 1, 30, 18, 0, 0).unwrap();
        assert_eq!(default_due_date(now, 30).unwrap(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(default_due_date(now, 0).unwrap(), NaiveDate::from_ymd_opt(2026, 1, 30).unwrap());
    }

    #[test]
    fn due_period_out_of_range_is_rejected() {
        let now = Utc::now();
        assert_matches!(default_due_date(now, -1), Err(BillingError::ValidationError(_)));
        assert_matches!(default_due_date(now, i64::MAX), Err(BillingError::ValidationError(_)));
    }
}
