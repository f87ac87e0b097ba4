use chrono::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    User
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
            UserRole::SuperAdmin => "super_admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

/// Subscription tier a user is on. `Free` never earns referral points.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "plan_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Basic,
    Premium,
    Vip,
}

impl PlanTier {
    pub fn to_str(&self) -> &str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
            PlanTier::Vip => "vip",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            PlanTier::Free => "Gratuito",
            PlanTier::Basic => "Básico",
            PlanTier::Premium => "Premium",
            PlanTier::Vip => "VIP",
        }
    }

    /// Accepts slugs as well as the checkout display names ("Básico", "VIP 12 meses").
    pub fn from_name(name: &str) -> Option<PlanTier> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }

        if name.contains("vip") {
            Some(PlanTier::Vip)
        } else if name.contains("premium") {
            Some(PlanTier::Premium)
        } else if name.contains("basic") || name.contains("básico") || name.contains("basico") {
            Some(PlanTier::Basic)
        } else if name.contains("free") || name.contains("gratuito") {
            Some(PlanTier::Free)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: uuid::Uuid,
    pub name: Option<String>,
    pub email: String,
    pub role: UserRole,
    pub plan: PlanTier,
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub points_balance: i64,
    pub free_months_remaining: i32,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unknown")
    }
}
