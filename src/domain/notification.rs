//! Notification records, categories and per-user delivery preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ContentLiked,
    ContentCommented,
    ContentReviewed,
    ContentRated,
    UserFollowed,
    UserMentioned,
    ContentApproved,
    ContentRejected,
    SystemAnnouncement,
    AccountUpdate,
    SecurityAlert,
    MarketplacePurchase,
    MarketplaceSale,
    MarketplaceCommission,
    ReferralSignup,
    ReferralReward,
    OrgInvite,
    OrgUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Social,
    System,
    Marketplace,
    Referral,
    Organization,
}

impl NotificationType {
    pub const ALL: [NotificationType; 18] = [
        NotificationType::ContentLiked,
        NotificationType::ContentCommented,
        NotificationType::ContentReviewed,
        NotificationType::ContentRated,
        NotificationType::UserFollowed,
        NotificationType::UserMentioned,
        NotificationType::ContentApproved,
        NotificationType::ContentRejected,
        NotificationType::SystemAnnouncement,
        NotificationType::AccountUpdate,
        NotificationType::SecurityAlert,
        NotificationType::MarketplacePurchase,
        NotificationType::MarketplaceSale,
        NotificationType::MarketplaceCommission,
        NotificationType::ReferralSignup,
        NotificationType::ReferralReward,
        NotificationType::OrgInvite,
        NotificationType::OrgUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ContentLiked => "content_liked",
            NotificationType::ContentCommented => "content_commented",
            NotificationType::ContentReviewed => "content_reviewed",
            NotificationType::ContentRated => "content_rated",
            NotificationType::UserFollowed => "user_followed",
            NotificationType::UserMentioned => "user_mentioned",
            NotificationType::ContentApproved => "content_approved",
            NotificationType::ContentRejected => "content_rejected",
            NotificationType::SystemAnnouncement => "system_announcement",
            NotificationType::AccountUpdate => "account_update",
            NotificationType::SecurityAlert => "security_alert",
            NotificationType::MarketplacePurchase => "marketplace_purchase",
            NotificationType::MarketplaceSale => "marketplace_sale",
            NotificationType::MarketplaceCommission => "marketplace_commission",
            NotificationType::ReferralSignup => "referral_signup",
            NotificationType::ReferralReward => "referral_reward",
            NotificationType::OrgInvite => "org_invite",
            NotificationType::OrgUpdate => "org_update",
        }
    }

    pub fn category(&self) -> NotificationCategory {
        use NotificationType::*;
        match self {
            ContentLiked | ContentCommented | ContentReviewed | ContentRated | UserFollowed
            | UserMentioned | ContentApproved | ContentRejected => NotificationCategory::Social,
            SystemAnnouncement | AccountUpdate | SecurityAlert => NotificationCategory::System,
            MarketplacePurchase | MarketplaceSale | MarketplaceCommission => {
                NotificationCategory::Marketplace
            }
            ReferralSignup | ReferralReward => NotificationCategory::Referral,
            OrgInvite | OrgUpdate => NotificationCategory::Organization,
        }
    }

    /// Types muted by `social_notifications = false`.
    ///
    /// Moderation outcomes (approved/rejected) are social by category but are always delivered.
    pub fn is_social_engagement(&self) -> bool {
        use NotificationType::*;
        matches!(
            self,
            ContentLiked | ContentCommented | ContentReviewed | ContentRated | UserFollowed | UserMentioned
        )
    }

    /// Types muted by `system_notifications = false`.
    pub fn is_system_broadcast(&self) -> bool {
        matches!(
            self,
            NotificationType::SystemAnnouncement | NotificationType::SecurityAlert
        )
    }
}

impl FromStr for NotificationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown notification type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Unread,
    Read,
    Archived,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
            NotificationStatus::Archived => "archived",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(NotificationStatus::Unread),
            "read" => Ok(NotificationStatus::Read),
            "archived" => Ok(NotificationStatus::Archived),
            other => Err(anyhow::anyhow!("unknown notification status '{}'", other)),
        }
    }
}

/// A notification waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: JsonValue,
    pub action_url: Option<String>,
    pub related_type: Option<String>,
    pub related_id: Option<String>,
    pub actor_id: Option<String>,
}

impl NewNotification {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            message: message.into(),
            data: JsonValue::Object(Default::default()),
            action_url: None,
            related_type: None,
            related_id: None,
            actor_id: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }

    pub fn with_related(mut self, related_type: impl Into<String>, related_id: impl Into<String>) -> Self {
        self.related_type = Some(related_type.into());
        self.related_id = Some(related_id.into());
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    /// Two queued notifications with the same key describe the same event.
    pub fn dedup_key(&self) -> (NotificationType, Option<&str>, Option<&str>, Option<&str>) {
        (
            self.notification_type,
            self.related_type.as_deref(),
            self.related_id.as_deref(),
            self.actor_id.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: JsonValue,
    pub status: NotificationStatus,
    pub action_url: Option<String>,
    pub related_type: Option<String>,
    pub related_id: Option<String>,
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub notifications_enabled: bool,
    pub social_notifications: bool,
    pub system_notifications: bool,
    pub marketplace_notifications: bool,
    pub referral_notifications: bool,
    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    pub timezone: String,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            social_notifications: true,
            system_notifications: true,
            marketplace_notifications: true,
            referral_notifications: true,
            quiet_hours_enabled: false,
            quiet_hours_start: Some("22:00".to_string()),
            quiet_hours_end: Some("08:00".to_string()),
            timezone: "UTC".to_string(),
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, notification_type: NotificationType) -> bool {
        if notification_type.is_social_engagement() {
            return self.social_notifications;
        }
        if notification_type.is_system_broadcast() {
            return self.system_notifications;
        }
        true
    }
}
