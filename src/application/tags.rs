use super::subscription::SubscriptionLookup;
use crate::domain::{check_color, check_name, Feature, Locked, Tag, TagInputError};
use crate::infrastructure::{RepositoryError, TagRepository};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("Tag not found")]
    NotFound,
    #[error("A tag with this name already exists")]
    Duplicate,
    #[error(transparent)]
    Invalid(#[from] TagInputError),
    #[error(transparent)]
    Locked(#[from] Locked),
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for TagError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(_) => TagError::Duplicate,
            RepositoryError::NotFound(_) => TagError::NotFound,
            other => TagError::Repository(other),
        }
    }
}

pub struct TagService<G: TagRepository> {
    tag_repo: Arc<G>,
    plans: Arc<dyn SubscriptionLookup>,
}

impl<G: TagRepository> TagService<G> {
    pub fn new(tag_repo: Arc<G>, plans: Arc<dyn SubscriptionLookup>) -> Self {
        Self { tag_repo, plans }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Tag>, TagError> {
        self.require_tags(user_id).await?;
        Ok(self.tag_repo.list_by_user(user_id).await?)
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        name: &str,
        color: Option<&str>,
    ) -> Result<Tag, TagError> {
        self.require_tags(user_id).await?;
        let tag = Tag::new(user_id, name, color)?;
        self.tag_repo.create(&tag).await?;
        Ok(tag)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        tag_id: Uuid,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<Tag, TagError> {
        self.require_tags(user_id).await?;
        let mut tag = self.owned(user_id, tag_id).await?;
        if let Some(name) = name {
            tag.name = check_name(name)?;
        }
        if color.is_some() {
            tag.color = check_color(color)?;
        }
        self.tag_repo.update(&tag).await?;
        Ok(tag)
    }

    pub async fn delete(&self, user_id: Uuid, tag_id: Uuid) -> Result<(), TagError> {
        self.require_tags(user_id).await?;
        let tag = self.owned(user_id, tag_id).await?;
        self.tag_repo.delete(tag.id).await?;
        Ok(())
    }

    /// Tags owned by someone else read as missing.
    pub async fn owned(&self, user_id: Uuid, tag_id: Uuid) -> Result<Tag, TagError> {
        let tag = self.tag_repo.get_by_id(tag_id).await?;
        if tag.user_id != user_id {
            return Err(TagError::NotFound);
        }
        Ok(tag)
    }

    async fn require_tags(&self, user_id: Uuid) -> Result<(), TagError> {
        self.plans.capabilities(user_id).await.require(Feature::Tags)?;
        Ok(())
    }
}
