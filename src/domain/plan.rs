use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanTier {
    Standard,
    Premium,
}

/// Numeric ceiling for a countable resource.
///
/// `Limited` sorts below `Unlimited`, so a larger plan always compares greater.
/// Serializes as the number, or `null` when unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quota {
    Limited(u64),
    Unlimited,
}

impl Quota {
    /// True when one more item may be created on top of `current`.
    pub fn allows_another(&self, current: u64) -> bool {
        match self {
            Quota::Limited(max) => current < *max,
            Quota::Unlimited => true,
        }
    }

    pub fn is_reached(&self, current: u64) -> bool {
        !self.allows_another(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_testimonials: Quota,
    pub max_forms: Quota,
    pub can_use_custom_fields: bool,
    pub can_use_branding: bool,
    pub can_use_video_uploads: bool,
    pub can_use_advanced_exports: bool,
    pub can_use_tags: bool,
    pub can_use_image_uploads: bool,
}

pub const STANDARD_LIMITS: PlanLimits = PlanLimits {
    max_testimonials: Quota::Limited(25),
    max_forms: Quota::Limited(1),
    can_use_custom_fields: false,
    can_use_branding: false,
    can_use_video_uploads: false,
    can_use_advanced_exports: false,
    can_use_tags: false,
    can_use_image_uploads: true,
};

pub const PREMIUM_LIMITS: PlanLimits = PlanLimits {
    max_testimonials: Quota::Unlimited,
    max_forms: Quota::Unlimited,
    can_use_custom_fields: true,
    can_use_branding: true,
    can_use_video_uploads: true,
    can_use_advanced_exports: true,
    can_use_tags: true,
    can_use_image_uploads: true,
};

impl PlanTier {
    pub fn limits(&self) -> &'static PlanLimits {
        match self {
            PlanTier::Standard => &STANDARD_LIMITS,
            PlanTier::Premium => &PREMIUM_LIMITS,
        }
    }
}

/// Limits for a possibly-unresolved plan. Anything unresolved gets the standard tier.
pub fn effective_limits(plan: Option<PlanTier>) -> &'static PlanLimits {
    plan.unwrap_or(PlanTier::Standard).limits()
}

/// Maps billing price ids to plan tiers by exact match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceCatalog {
    pub standard_price_id: String,
    pub premium_price_id: String,
}

impl PriceCatalog {
    pub fn new(standard_price_id: impl Into<String>, premium_price_id: impl Into<String>) -> Self {
        Self {
            standard_price_id: standard_price_id.into(),
            premium_price_id: premium_price_id.into(),
        }
    }

    pub fn plan_for(&self, price_id: &str) -> Option<PlanTier> {
        if price_id == self.standard_price_id {
            Some(PlanTier::Standard)
        } else if price_id == self.premium_price_id {
            Some(PlanTier::Premium)
        } else {
            None
        }
    }

    pub fn price_for(&self, plan: PlanTier) -> &str {
        match plan {
            PlanTier::Standard => &self.standard_price_id,
            PlanTier::Premium => &self.premium_price_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premium_dominates_standard_on_every_flag() {
        let s = PlanTier::Standard.limits();
        let p = PlanTier::Premium.limits();
        assert!(p.max_testimonials >= s.max_testimonials);
        assert!(p.max_forms >= s.max_forms);
        let pairs = [
            (s.can_use_custom_fields, p.can_use_custom_fields),
            (s.can_use_branding, p.can_use_branding),
            (s.can_use_video_uploads, p.can_use_video_uploads),
            (s.can_use_advanced_exports, p.can_use_advanced_exports),
            (s.can_use_tags, p.can_use_tags),
            (s.can_use_image_uploads, p.can_use_image_uploads),
        ];
        for (standard, premium) in pairs {
            assert!(premium >= standard);
        }
    }

    #[test]
    fn standard_table_values() {
        let s = STANDARD_LIMITS;
        assert_eq!(s.max_testimonials, Quota::Limited(25));
        assert_eq!(s.max_forms, Quota::Limited(1));
        assert!(s.can_use_image_uploads);
        assert!(!s.can_use_tags && !s.can_use_branding && !s.can_use_custom_fields);
    }

    #[test]
    fn unresolved_plan_gets_standard() {
        assert_eq!(effective_limits(None), &STANDARD_LIMITS);
        assert_eq!(effective_limits(Some(PlanTier::Premium)), &PREMIUM_LIMITS);
    }

    #[test]
    fn quota_boundaries() {
        let q = Quota::Limited(25);
        assert!(q.allows_another(24));
        assert!(q.is_reached(25));
        assert!(Quota::Unlimited.allows_another(u64::MAX));
    }

    #[test]
    fn quota_serializes_unlimited_as_null() {
        let json = serde_json::to_value(PREMIUM_LIMITS).unwrap();
        assert!(json["maxTestimonials"].is_null());
        let json = serde_json::to_value(STANDARD_LIMITS).unwrap();
        assert_eq!(json["maxForms"], 1);
    }

    #[test]
    fn catalog_matches_exactly() {
        let catalog = PriceCatalog::new("price_std", "price_prem");
        assert_eq!(catalog.plan_for("price_std"), Some(PlanTier::Standard));
        assert_eq!(catalog.plan_for("price_prem"), Some(PlanTier::Premium));
        assert_eq!(catalog.plan_for("price_std "), None);
        assert_eq!(catalog.plan_for("price_other"), None);
    }
}
