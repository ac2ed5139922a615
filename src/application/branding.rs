use super::subscription::SubscriptionLookup;
use crate::domain::{is_hex_color, Branding, Feature, Locked, FONT_FAMILIES};
use crate::infrastructure::{BrandingRepository, RepositoryError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BrandingError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Locked(#[from] Locked),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Default)]
pub struct BrandingChanges {
    /// `Some("")` clears the logo.
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub font_family: Option<String>,
}

pub struct BrandingService<R: BrandingRepository> {
    branding_repo: Arc<R>,
    plans: Arc<dyn SubscriptionLookup>,
}

impl<R: BrandingRepository> BrandingService<R> {
    pub fn new(branding_repo: Arc<R>, plans: Arc<dyn SubscriptionLookup>) -> Self {
        Self {
            branding_repo,
            plans,
        }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Branding, BrandingError> {
        self.require_branding(user_id).await?;
        self.stored_or_default(user_id).await
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        changes: BrandingChanges,
    ) -> Result<Branding, BrandingError> {
        self.require_branding(user_id).await?;
        let mut branding = self.stored_or_default(user_id).await?;

        if let Some(logo_url) = changes.logo_url {
            branding.logo_url = checked_logo_url(logo_url)?;
        }
        if let Some(color) = changes.primary_color {
            branding.primary_color = checked_color("Primary color", color)?;
        }
        if let Some(color) = changes.secondary_color {
            branding.secondary_color = checked_color("Secondary color", color)?;
        }
        if let Some(font) = changes.font_family {
            if !FONT_FAMILIES.contains(&font.as_str()) {
                return Err(BrandingError::Validation(format!(
                    "Unsupported font family: {}",
                    font
                )));
            }
            branding.font_family = font;
        }
        branding.updated_at = Utc::now();

        self.branding_repo.upsert(&branding).await?;
        Ok(branding)
    }

    /// Branding to render for a form owner's public pages, or `None` when their
    /// plan does not include it.
    pub async fn public_for(&self, owner_id: Uuid) -> Result<Option<Branding>, BrandingError> {
        if !self.plans.capabilities(owner_id).await.allows(Feature::Branding) {
            return Ok(None);
        }
        Ok(self.branding_repo.get_by_user(owner_id).await?)
    }

    async fn stored_or_default(&self, user_id: Uuid) -> Result<Branding, BrandingError> {
        Ok(self
            .branding_repo
            .get_by_user(user_id)
            .await?
            .unwrap_or_else(|| Branding::default_for(user_id)))
    }

    async fn require_branding(&self, user_id: Uuid) -> Result<(), BrandingError> {
        self.plans
            .capabilities(user_id)
            .await
            .require(Feature::Branding)?;
        Ok(())
    }
}

fn checked_color(name: &str, value: String) -> Result<String, BrandingError> {
    if is_hex_color(&value) {
        Ok(value)
    } else {
        Err(BrandingError::Validation(format!(
            "{} must be a hex color like #01004d",
            name
        )))
    }
}

fn checked_logo_url(value: String) -> Result<Option<String>, BrandingError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.starts_with("https://") || value.starts_with("http://") {
        Ok(Some(value.to_string()))
    } else {
        Err(BrandingError::Validation(
            "Logo URL must start with http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logo_url_must_be_http() {
        assert_eq!(checked_logo_url("  ".into()).unwrap(), None);
        assert!(checked_logo_url("javascript:alert(1)".into()).is_err());
        assert_eq!(
            checked_logo_url("https://cdn.example.com/logo.png".into()).unwrap(),
            Some("https://cdn.example.com/logo.png".to_string())
        );
    }

    #[test]
    fn colors_are_validated() {
        assert!(checked_color("Primary color", "#01004d".into()).is_ok());
        assert!(checked_color("Primary color", "red".into()).is_err());
    }
}
