//! Fraud-risk scoring for transfer variances.
//!
//! `score_variance` is a pure function over the scored variance and the
//! explicit population of open variances. It is recomputed on every read
//! and never persisted, so the cross-variance signals (repeat offenders at
//! an outlet, repeat shrinkage of an item) always reflect current state.
//!
//! Reviewer note on `LargeQuantityTheft`: the trigger is `variance < -50`,
//! which under `variance = expected - received` fires on large *overages*.
//! The published behavior is preserved here verbatim; whether the polarity
//! matches the intended business meaning is a stakeholder question.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;
use utoipa::ToSchema;

use crate::entities::transfer_variance::{self, VarianceSeverity, VarianceStatus};

const MAX_SCORE: u32 = 100;
const HIGH_RISK_CUTOFF: u32 = 60;

const HIGH_VALUE_POINTS: u32 = 35;
const STOCK_LOSS_POINTS: u32 = 20;
const CRITICAL_SEVERITY_POINTS: u32 = 25;
const OUTLET_CLUSTER_POINTS: u32 = 30;
const ITEM_CLUSTER_POINTS: u32 = 20;
const STALE_POINTS: u32 = 15;

const OUTLET_CLUSTER_MIN: usize = 3;
const ITEM_CLUSTER_MIN: usize = 2;
const PATTERN_CLUSTER_MIN: usize = 3;
const STALE_AGE_DAYS: i64 = 7;

fn high_value_cutoff() -> Decimal {
    Decimal::new(10_000, 0)
}
fn systematic_value_cutoff() -> Decimal {
    Decimal::new(5_000, 0)
}
fn theft_value_cutoff() -> Decimal {
    Decimal::new(20_000, 0)
}
const THEFT_OVERAGE_CUTOFF: i32 = -50;

/// Named fraud pattern, mutually exclusive, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FraudPattern {
    #[strum(serialize = "Systematic Losses at Location")]
    SystematicLocationLosses,
    #[strum(serialize = "Repeated Product Shrinkage")]
    RepeatedProductShrinkage,
    #[strum(serialize = "Large Quantity Theft Suspected")]
    LargeQuantityTheft,
}

/// Derived, non-persisted risk view of a single variance.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RiskAssessment {
    /// 0..=100 weighted composite.
    pub score: u32,
    pub is_high_risk: bool,
    pub flags: Vec<String>,
    #[schema(value_type = Option<String>)]
    pub pattern: Option<FraudPattern>,
}

/// Scores one variance against the population of open variances.
///
/// `open_variances` may include the subject and closed records; both are
/// filtered out of the cross-variance counts here, so callers can pass a
/// raw query result.
pub fn score_variance(
    subject: &transfer_variance::Model,
    open_variances: &[transfer_variance::Model],
    now: DateTime<Utc>,
) -> RiskAssessment {
    let mut score: u32 = 0;
    let mut flags: Vec<String> = Vec::new();

    let value_magnitude = subject.variance_value.abs();

    let same_outlet_open = open_variances
        .iter()
        .filter(|v| v.id != subject.id && !v.status().is_closed() && v.outlet_id == subject.outlet_id)
        .count();

    let same_item_open = open_variances
        .iter()
        .filter(|v| {
            v.id != subject.id
                && !v.status().is_closed()
                && v.item_id == subject.item_id
                && v.item_kind == subject.item_kind
        })
        .count();

    if value_magnitude > high_value_cutoff() {
        score += HIGH_VALUE_POINTS;
        flags.push("High Value Loss".to_string());
    }

    if subject.variance > 0 {
        score += STOCK_LOSS_POINTS;
        flags.push("Stock Loss".to_string());
    }

    if subject.severity() == VarianceSeverity::Critical {
        score += CRITICAL_SEVERITY_POINTS;
        flags.push("Critical Severity".to_string());
    }

    if same_outlet_open >= OUTLET_CLUSTER_MIN {
        score += OUTLET_CLUSTER_POINTS;
        flags.push(format!("{} Unresolved at Location", same_outlet_open));
    }

    if same_item_open >= ITEM_CLUSTER_MIN {
        score += ITEM_CLUSTER_POINTS;
        flags.push(format!("{} Unresolved for Product", same_item_open));
    }

    let age_days = (now - subject.created_at).num_days();
    if subject.status() == VarianceStatus::Open && age_days > STALE_AGE_DAYS {
        score += STALE_POINTS;
        flags.push(format!("Unresolved for {} Days", age_days));
    }

    let pattern = classify_pattern(subject, same_outlet_open, same_item_open, value_magnitude);

    let score = score.min(MAX_SCORE);

    RiskAssessment {
        score,
        is_high_risk: score >= HIGH_RISK_CUTOFF,
        flags,
        pattern,
    }
}

fn classify_pattern(
    subject: &transfer_variance::Model,
    same_outlet_open: usize,
    same_item_open: usize,
    value_magnitude: Decimal,
) -> Option<FraudPattern> {
    if same_outlet_open >= PATTERN_CLUSTER_MIN && value_magnitude > systematic_value_cutoff() {
        Some(FraudPattern::SystematicLocationLosses)
    } else if same_item_open >= PATTERN_CLUSTER_MIN {
        Some(FraudPattern::RepeatedProductShrinkage)
    } else if subject.variance < THEFT_OVERAGE_CUTOFF && value_magnitude > theft_value_cutoff() {
        Some(FraudPattern::LargeQuantityTheft)
    } else {
        None
    }
}
