// service/rewards.rs
//! Reward policy: points per plan, bonus steps, free-month milestones
//! and the points-to-cash rate. Pure functions, no I/O.
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::models::usermodel::PlanTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BonusStep {
    pub min_confirmed: i64,
    pub bonus_points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferralAward {
    pub base_points: i64,
    pub bonus_points: i64,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardPolicy {
    pub basic_points: i64,
    pub premium_points: i64,
    pub vip_points: i64,
    /// Sorted by `min_confirmed`, ascending.
    pub bonus_schedule: Vec<BonusStep>,
    pub free_month_threshold: i64,
    pub cashback_min_points: i64,
    pub points_per_real: i64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        RewardPolicy {
            basic_points: 100,
            premium_points: 200,
            vip_points: 600,
            bonus_schedule: vec![
                BonusStep { min_confirmed: 2, bonus_points: 150 },
                BonusStep { min_confirmed: 3, bonus_points: 200 },
                BonusStep { min_confirmed: 4, bonus_points: 250 },
            ],
            free_month_threshold: 2,
            cashback_min_points: 100,
            points_per_real: 10,
        }
    }
}

impl RewardPolicy {
    pub fn base_points(&self, plan: PlanTier) -> i64 {
        match plan {
            PlanTier::Free => 0,
            PlanTier::Basic => self.basic_points,
            PlanTier::Premium => self.premium_points,
            PlanTier::Vip => self.vip_points,
        }
    }

    /// Bonus for a new referral given how many were confirmed before it.
    pub fn bonus_points(&self, confirmed_before: i64) -> i64 {
        self.bonus_schedule
            .iter()
            .rev()
            .find(|step| confirmed_before >= step.min_confirmed)
            .map(|step| step.bonus_points)
            .unwrap_or(0)
    }

    /// `None` when the plan earns nothing.
    pub fn referral_award(&self, plan: PlanTier, confirmed_before: i64) -> Option<ReferralAward> {
        let base_points = self.base_points(plan);
        if base_points <= 0 {
            return None;
        }
        let bonus_points = self.bonus_points(confirmed_before);
        Some(ReferralAward {
            base_points,
            bonus_points,
            total_points: base_points + bonus_points,
        })
    }

    /// Cents paid out for `points`; partial reais are dropped.
    pub fn cash_amount_cents(&self, points: i64) -> i64 {
        (points / self.points_per_real) * 100
    }

    pub fn is_free_month_milestone(&self, monthly_count: i64) -> bool {
        monthly_count > 0 && monthly_count % self.free_month_threshold == 0
    }

    pub fn referrals_to_next_free_month(&self, monthly_count: i64) -> i64 {
        self.free_month_threshold - monthly_count.rem_euclid(self.free_month_threshold)
    }
}

/// Parses `"2:150,3:200,4:250"` into bonus steps.
pub fn parse_bonus_schedule(raw: &str) -> Result<Vec<BonusStep>, String> {
    let mut steps = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (count, bonus) = part
            .split_once(':')
            .ok_or_else(|| format!("bonus step '{}' must look like <count>:<points>", part))?;
        let min_confirmed = count
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid count in bonus step '{}': {}", part, e))?;
        let bonus_points = bonus
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid points in bonus step '{}': {}", part, e))?;
        if min_confirmed < 0 || bonus_points < 0 {
            return Err(format!("bonus step '{}' must not be negative", part));
        }
        steps.push(BonusStep { min_confirmed, bonus_points });
    }
    steps.sort_by_key(|step| step.min_confirmed);
    Ok(steps)
}

/// `[first instant of the month, first instant of the next month)` in UTC.
pub fn month_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    (first_instant(year, month), first_instant(next_year, next_month))
}

fn first_instant(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
