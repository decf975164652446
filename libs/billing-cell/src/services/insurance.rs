use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::filters::RestQuery;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    BillingError, CreateInsuranceProviderRequest, InsuranceProvider, UpdateInsuranceProviderRequest,
};

const PROVIDERS_TABLE: &str = "insurance_providers";

fn validate_coverage(coverage_percentage: f64, max_coverage_amount: Option<f64>) -> Result<(), BillingError> {
    if !(0.0..=100.0).contains(&coverage_percentage) {
        return Err(BillingError::ValidationError(format!(
            "Coverage percentage {} must be between 0 and 100",
            coverage_percentage
        )));
    }
    if matches!(max_coverage_amount, Some(max) if max < 0.0) {
        return Err(BillingError::InvalidAmount("Maximum coverage cannot be negative".to_string()));
    }
    Ok(())
}

/// Providers are shared by every branch.
pub struct InsuranceService {
    supabase: Arc<SupabaseClient>,
}

impl InsuranceService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<InsuranceProvider>, BillingError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| BillingError::DatabaseError(format!("Failed to parse insurance provider: {}", e)))
            })
            .collect()
    }

    pub async fn create_provider(
        &self,
        request: CreateInsuranceProviderRequest,
        auth_token: &str,
    ) -> Result<InsuranceProvider, BillingError> {
        if request.name.trim().is_empty() {
            return Err(BillingError::ValidationError("Provider name cannot be empty".to_string()));
        }
        validate_coverage(request.coverage_percentage, request.max_coverage_amount)?;

        let now = Utc::now().to_rfc3339();
        let body = json!({
            "id": Uuid::new_v4(),
            "name": request.name.trim(),
            "coverage_percentage": request.coverage_percentage,
            "max_coverage_amount": request.max_coverage_amount,
            "contact_email": request.contact_email,
            "contact_phone": request.contact_phone,
            "is_active": true,
            "created_at": now,
            "updated_at": now
        });

        let rows = self.supabase
            .request_returning(Method::POST, &RestQuery::table(PROVIDERS_TABLE).build(), Some(auth_token), body)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        let provider = Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| BillingError::DatabaseError("Failed to create insurance provider".to_string()))?;

        info!("Insurance provider {} created ({}% cover)", provider.name, provider.coverage_percentage);
        Ok(provider)
    }

    pub async fn get_provider(&self, provider_id: Uuid, auth_token: &str) -> Result<InsuranceProvider, BillingError> {
        let path = RestQuery::table(PROVIDERS_TABLE).eq("id", provider_id).limit(1).build();
        let rows: AnyResult<Vec<Value>> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await;

        Self::parse_rows(rows.map_err(|e| BillingError::DatabaseError(e.to_string()))?)?
            .into_iter()
            .next()
            .ok_or(BillingError::ProviderNotFound)
    }

    pub async fn list_providers(&self, active_only: bool, auth_token: &str) -> Result<Vec<InsuranceProvider>, BillingError> {
        let mut query = RestQuery::table(PROVIDERS_TABLE);
        if active_only {
            query = query.eq("is_active", true);
        }
        let path = query.order("name.asc").build();

        debug!("Listing insurance providers (active_only={})", active_only);
        let rows: AnyResult<Vec<Value>> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await;
        Self::parse_rows(rows.map_err(|e| BillingError::DatabaseError(e.to_string()))?)
    }

    pub async fn update_provider(
        &self,
        provider_id: Uuid,
        request: UpdateInsuranceProviderRequest,
        auth_token: &str,
    ) -> Result<InsuranceProvider, BillingError> {
        let current = self.get_provider(provider_id, auth_token).await?;
        validate_coverage(
            request.coverage_percentage.unwrap_or(current.coverage_percentage),
            request.max_coverage_amount.or(current.max_coverage_amount),
        )?;

        let mut update_data = Map::new();
        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(BillingError::ValidationError("Provider name cannot be empty".to_string()));
            }
            update_data.insert("name".to_string(), json!(name.trim()));
        }
        if let Some(pct) = request.coverage_percentage {
            update_data.insert("coverage_percentage".to_string(), json!(pct));
        }
        if let Some(max) = request.max_coverage_amount {
            update_data.insert("max_coverage_amount".to_string(), json!(max));
        }
        if let Some(email) = request.contact_email {
            update_data.insert("contact_email".to_string(), json!(email));
        }
        if let Some(phone) = request.contact_phone {
            update_data.insert("contact_phone".to_string(), json!(phone));
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }

        if update_data.is_empty() {
            return Err(BillingError::ValidationError("No fields to update".to_string()));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = RestQuery::table(PROVIDERS_TABLE).eq("id", provider_id).build();
        let rows = self.supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Value::Object(update_data))
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        let updated = Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(BillingError::ProviderNotFound)?;

        info!("Insurance provider {} updated", updated.id);
        Ok(updated)
    }
}
