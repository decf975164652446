use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{ClaimSummary, InsuranceProvider, Invoice, InvoiceStatus};
use crate::services::calculation::round_cents;

/// Per-provider totals over insured, non-cancelled invoices, largest cover first.
pub fn summarize_claims(invoices: &[Invoice], providers: &[InsuranceProvider]) -> Vec<ClaimSummary> {
    let names: HashMap<Uuid, &str> = providers.iter().map(|p| (p.id, p.name.as_str())).collect();
    let mut by_provider: HashMap<Uuid, ClaimSummary> = HashMap::new();

    for invoice in invoices.iter().filter(|i| i.status != InvoiceStatus::Cancelled) {
        let Some(provider_id) = invoice.insurance_provider_id else {
            continue;
        };

        let entry = by_provider.entry(provider_id).or_insert_with(|| ClaimSummary {
            provider_id,
            provider_name: names.get(&provider_id).copied().unwrap_or("Unknown provider").to_string(),
            invoice_count: 0,
            total_billed: 0.0,
            total_covered: 0.0,
            patient_responsibility: 0.0,
        });
        entry.invoice_count += 1;
        entry.total_billed += invoice.total;
        entry.total_covered += invoice.insurance_coverage;
        entry.patient_responsibility += invoice.patient_responsibility;
    }

    let mut summaries: Vec<ClaimSummary> = by_provider
        .into_values()
        .map(|mut s| {
            s.total_billed = round_cents(s.total_billed);
            s.total_covered = round_cents(s.total_covered);
            s.patient_responsibility = round_cents(s.patient_responsibility);
            s
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.total_covered
            .total_cmp(&a.total_covered)
            .then_with(|| a.provider_name.cmp(&b.provider_name))
    });
    summaries
}
