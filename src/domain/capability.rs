use super::plan::PlanLimits;
use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    CustomFields,
    Branding,
    VideoUploads,
    AdvancedExports,
    Tags,
    ImageUploads,
}

impl Feature {
    pub fn label(&self) -> &'static str {
        match self {
            Feature::CustomFields => "Custom fields",
            Feature::Branding => "Custom branding",
            Feature::VideoUploads => "Video testimonials",
            Feature::AdvancedExports => "Advanced exports",
            Feature::Tags => "Tags",
            Feature::ImageUploads => "Image uploads",
        }
    }

    pub fn upgrade_message(&self) -> String {
        format!(
            "{} is available with Premium. Upgrade to unlock this feature.",
            self.label()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Locked,
    Unlocked,
}

/// Per-feature gates, computed once from the resolved limits when a view is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    limits: PlanLimits,
}

impl Capabilities {
    pub fn from_limits(limits: &PlanLimits) -> Self {
        Self { limits: *limits }
    }

    pub fn gate(&self, feature: Feature) -> Gate {
        let unlocked = match feature {
            Feature::CustomFields => self.limits.can_use_custom_fields,
            Feature::Branding => self.limits.can_use_branding,
            Feature::VideoUploads => self.limits.can_use_video_uploads,
            Feature::AdvancedExports => self.limits.can_use_advanced_exports,
            Feature::Tags => self.limits.can_use_tags,
            Feature::ImageUploads => self.limits.can_use_image_uploads,
        };
        if unlocked {
            Gate::Unlocked
        } else {
            Gate::Locked
        }
    }

    pub fn allows(&self, feature: Feature) -> bool {
        self.gate(feature) == Gate::Unlocked
    }

    pub fn require(&self, feature: Feature) -> Result<(), Locked> {
        match self.gate(feature) {
            Gate::Unlocked => Ok(()),
            Gate::Locked => Err(Locked(feature)),
        }
    }

    /// Gate map as sent to clients, keyed by feature name.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        Feature::iter()
            .map(|f| {
                (
                    f.to_string(),
                    serde_json::to_value(self.gate(f)).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect()
    }
}

/// A premium-only feature was requested on a plan that does not include it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.upgrade_message())]
pub struct Locked(pub Feature);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::{PREMIUM_LIMITS, STANDARD_LIMITS};

    #[test]
    fn standard_only_unlocks_images() {
        let caps = Capabilities::from_limits(&STANDARD_LIMITS);
        for feature in Feature::iter() {
            let expected = if feature == Feature::ImageUploads {
                Gate::Unlocked
            } else {
                Gate::Locked
            };
            assert_eq!(caps.gate(feature), expected, "{feature}");
        }
    }

    #[test]
    fn premium_unlocks_everything() {
        let caps = Capabilities::from_limits(&PREMIUM_LIMITS);
        assert!(Feature::iter().all(|f| caps.allows(f)));
    }

    #[test]
    fn locked_carries_upgrade_message() {
        let caps = Capabilities::from_limits(&STANDARD_LIMITS);
        let err = caps.require(Feature::Tags).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tags is available with Premium. Upgrade to unlock this feature."
        );
    }

    #[test]
    fn map_lists_every_feature() {
        let map = Capabilities::from_limits(&STANDARD_LIMITS).to_map();
        assert_eq!(map.len(), 6);
        assert_eq!(map["tags"], "locked");
        assert_eq!(map["image_uploads"], "unlocked");
    }
}
