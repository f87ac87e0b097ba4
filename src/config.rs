// config.rs
use std::{collections::HashMap, fmt::Display, str::FromStr};

use anyhow::{anyhow, bail, Context, Result};

use crate::{
    models::usermodel::PlanTier,
    service::rewards::{parse_bonus_schedule, RewardPolicy},
};

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    /// Stripe price id -> plan.
    pub price_plans: HashMap<String, PlanTier>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub app_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub stripe: StripeConfig,
    pub rewards: RewardPolicy,
}

impl Config {
    pub fn init() -> Result<Config> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET_KEY").context("JWT_SECRET_KEY must be set")?;
        let app_url = std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| app_url.clone())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let mut price_plans = HashMap::new();
        for (key, plan) in [
            ("STRIPE_PRICE_BASICO", PlanTier::Basic),
            ("STRIPE_PRICE_PREMIUM", PlanTier::Premium),
            ("STRIPE_PRICE_VIP", PlanTier::Vip),
        ] {
            if let Ok(price_id) = std::env::var(key) {
                if !price_id.trim().is_empty() {
                    price_plans.insert(price_id.trim().to_string(), plan);
                }
            }
        }

        let stripe = StripeConfig {
            secret_key: std::env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            price_plans,
        };

        let defaults = RewardPolicy::default();
        let bonus_schedule = match std::env::var("REFERRAL_BONUS_SCHEDULE") {
            Ok(raw) => parse_bonus_schedule(&raw)
                .map_err(|e| anyhow!("REFERRAL_BONUS_SCHEDULE: {}", e))?,
            Err(_) => defaults.bonus_schedule.clone(),
        };

        let rewards = RewardPolicy {
            basic_points: env_or("REFERRAL_POINTS_BASIC", defaults.basic_points)?,
            premium_points: env_or("REFERRAL_POINTS_PREMIUM", defaults.premium_points)?,
            vip_points: env_or("REFERRAL_POINTS_VIP", defaults.vip_points)?,
            bonus_schedule,
            free_month_threshold: env_or("FREE_MONTH_THRESHOLD", defaults.free_month_threshold)?,
            cashback_min_points: env_or("CASHBACK_MIN_POINTS", defaults.cashback_min_points)?,
            points_per_real: env_or("POINTS_PER_REAL", defaults.points_per_real)?,
        };

        if rewards.free_month_threshold <= 0 {
            bail!("FREE_MONTH_THRESHOLD must be greater than zero");
        }
        if rewards.points_per_real <= 0 {
            bail!("POINTS_PER_REAL must be greater than zero");
        }

        Ok(Config {
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 20)?,
            app_url,
            jwt_secret,
            port: env_or("PORT", 8000)?,
            cors_origins,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),
            stripe,
            rewards,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub fn test_config() -> Config {
    let mut price_plans = HashMap::new();
    price_plans.insert("price_basic".to_string(), PlanTier::Basic);
    price_plans.insert("price_premium".to_string(), PlanTier::Premium);
    price_plans.insert("price_vip".to_string(), PlanTier::Vip);

    Config {
        database_url: "postgres://localhost/test".to_string(),
        database_max_connections: 1,
        app_url: "http://localhost:3000".to_string(),
        jwt_secret: "test-jwt-secret".to_string(),
        port: 8000,
        cors_origins: vec!["http://localhost:3000".to_string()],
        log_level: "debug".to_string(),
        stripe: StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            api_base: "http://stripe.invalid/v1".to_string(),
            price_plans,
        },
        rewards: RewardPolicy::default(),
    }
}
