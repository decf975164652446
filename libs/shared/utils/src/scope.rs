use serde::Deserialize;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::roles::StaffRole;

/// `?branch_id=` accepted by every branch-owned endpoint; only admins may point it elsewhere.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub branch_id: Option<String>,
}

/// Row-level tenancy filter resolved from the caller and an optional requested branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchScope {
    Branch(String),
    /// Admin without a home branch and no explicit request.
    AllBranches,
}

impl BranchScope {
    pub fn resolve(user: &User, requested: Option<&str>) -> Result<Self, AppError> {
        let role = require_staff(user)?;

        if role.is_admin() {
            return Ok(match (requested, user.branch_id.as_deref()) {
                (Some(branch), _) => BranchScope::Branch(branch.to_string()),
                (None, Some(home)) => BranchScope::Branch(home.to_string()),
                (None, None) => BranchScope::AllBranches,
            });
        }

        let home = user
            .branch_id
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("Staff account has no branch assigned".to_string()))?;

        if let Some(branch) = requested {
            if branch != home {
                return Err(AppError::Forbidden(
                    "Not authorized to access another branch".to_string(),
                ));
            }
        }

        Ok(BranchScope::Branch(home.to_string()))
    }

    pub fn branch_id(&self) -> Option<&str> {
        match self {
            BranchScope::Branch(id) => Some(id),
            BranchScope::AllBranches => None,
        }
    }

    /// Branch new records are written to. Creating requires a concrete branch.
    pub fn require_branch(&self) -> Result<&str, AppError> {
        self.branch_id().ok_or_else(|| {
            AppError::BadRequest("branch_id is required for this operation".to_string())
        })
    }
}

pub fn require_staff(user: &User) -> Result<StaffRole, AppError> {
    user.staff_role()
        .ok_or_else(|| AppError::Forbidden("Staff role required".to_string()))
}

/// Admin always passes.
pub fn require_any_role(user: &User, allowed: &[StaffRole]) -> Result<StaffRole, AppError> {
    let role = require_staff(user)?;
    if role.is_admin() || allowed.contains(&role) {
        Ok(role)
    } else {
        Err(AppError::Forbidden(format!(
            "Role {} is not permitted to perform this action",
            role
        )))
    }
}
