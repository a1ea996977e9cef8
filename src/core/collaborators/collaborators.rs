// Ports for the systems moderation talks to but does not own.
//
// The content store owns posts, reviews and comments. The reputation
// directory owns roles and reputation points. Moderation reads from both and
// pushes visibility changes and penalty effects back.

use crate::core::moderation::{ContentSubmission, ContentType, ImageDescriptor};
use crate::core::penalties::UserPenalty;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// What the content store reports about one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    pub content_id: String,
    pub author_id: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageDescriptor>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

fn visible_by_default() -> bool {
    true
}

impl ContentSnapshot {
    pub fn from_submission(submission: &ContentSubmission) -> Self {
        Self {
            content_id: submission.content_id.clone(),
            author_id: submission.author_id.clone(),
            content_type: submission.content_type,
            text: submission.text.clone(),
            images: submission.images.clone(),
            visible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Moderator,
    Admin,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content(&self, content_id: &str)
        -> Result<Option<ContentSnapshot>, CollaboratorError>;

    async fn set_visibility(&self, content_id: &str, visible: bool)
        -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait ReputationDirectory: Send + Sync {
    async fn has_role(&self, user_id: &str, role: Role) -> Result<bool, CollaboratorError>;

    /// Called after a penalty is recorded (e.g. deduct reputation).
    async fn apply_penalty_effect(
        &self,
        user_id: &str,
        penalty: &UserPenalty,
    ) -> Result<(), CollaboratorError>;

    /// Called after a penalty is reversed.
    async fn revert_penalty_effect(
        &self,
        user_id: &str,
        penalty: &UserPenalty,
    ) -> Result<(), CollaboratorError>;
}
