use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permissions::Rank;

pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Welcome {username} to {group_name}! Please read the group rules.";
pub const DEFAULT_GOODBYE_MESSAGE: &str = "{username} has left the group. Farewell!";
pub const DEFAULT_RULES: &str = "No rules have been set for this group yet.";

/// Per-member state within one group. An absent entry is equivalent to
/// `MemberRecord::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberRecord {
    pub rank: Rank,
    pub warning_count: u32,
}

/// Typed group settings. Every field has a documented default so records
/// written by older versions (or with missing fields) still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    /// Screen messages against the content filter. Default on.
    pub moderation_enabled: bool,
    /// Remove matching messages instead of only flagging them. Default on.
    pub auto_delete_enabled: bool,
    /// Greet new members. Default on.
    pub welcome_enabled: bool,
    /// Say goodbye when members leave. Default off.
    pub goodbye_enabled: bool,
    pub welcome_message: String,
    pub goodbye_message: String,
    pub rules: String,
    /// Lowercased keywords matched as whole words by the content screen.
    pub blocked_terms: Vec<String>,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            moderation_enabled: true,
            auto_delete_enabled: true,
            welcome_enabled: true,
            goodbye_enabled: false,
            welcome_message: DEFAULT_WELCOME_MESSAGE.into(),
            goodbye_message: DEFAULT_GOODBYE_MESSAGE.into(),
            rules: DEFAULT_RULES.into(),
            blocked_terms: Vec::new(),
        }
    }
}

impl GroupSettings {
    pub fn get(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::Moderation => self.moderation_enabled,
            SettingKey::AutoDelete => self.auto_delete_enabled,
            SettingKey::Welcome => self.welcome_enabled,
            SettingKey::Goodbye => self.goodbye_enabled,
        }
    }

    pub fn set(&mut self, key: SettingKey, value: bool) {
        match key {
            SettingKey::Moderation => self.moderation_enabled = value,
            SettingKey::AutoDelete => self.auto_delete_enabled = value,
            SettingKey::Welcome => self.welcome_enabled = value,
            SettingKey::Goodbye => self.goodbye_enabled = value,
        }
    }

    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::WelcomeMessage => &self.welcome_message,
            TextField::GoodbyeMessage => &self.goodbye_message,
            TextField::Rules => &self.rules,
        }
    }

    pub fn set_text(&mut self, field: TextField, value: String) {
        match field {
            TextField::WelcomeMessage => self.welcome_message = value,
            TextField::GoodbyeMessage => self.goodbye_message = value,
            TextField::Rules => self.rules = value,
        }
    }
}

/// Boolean toggles in `GroupSettings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    Moderation,
    AutoDelete,
    Welcome,
    Goodbye,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::Moderation,
        SettingKey::AutoDelete,
        SettingKey::Welcome,
        SettingKey::Goodbye,
    ];

    /// Accepts the short command names (`autodelete`) and the stored field
    /// names (`auto_delete_enabled`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moderation" | "moderation_enabled" => Some(Self::Moderation),
            "autodelete" | "auto_delete" | "auto_delete_enabled" => Some(Self::AutoDelete),
            "welcome" | "welcome_enabled" => Some(Self::Welcome),
            "goodbye" | "goodbye_enabled" => Some(Self::Goodbye),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moderation => "moderation",
            Self::AutoDelete => "autodelete",
            Self::Welcome => "welcome",
            Self::Goodbye => "goodbye",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text fields in `GroupSettings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    WelcomeMessage,
    GoodbyeMessage,
    Rules,
}

impl TextField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "welcome" | "welcome_message" => Some(Self::WelcomeMessage),
            "goodbye" | "goodbye_message" => Some(Self::GoodbyeMessage),
            "rules" => Some(Self::Rules),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WelcomeMessage => "welcome_message",
            Self::GoodbyeMessage => "goodbye_message",
            Self::Rules => "rules",
        }
    }
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counters shown by `/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupStats {
    pub message_count: u64,
    pub warnings_issued: u64,
    pub users_banned: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Promote,
    Demote,
    Ban,
    Unban,
    Mute,
    Unmute,
    Warn,
    AutoRestrict,
    SettingChanged,
    TextChanged,
}

/// One moderation action recorded in a group's audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub actor_id: String,
    pub target_id: Option<String>,
    pub action: AuditAction,
    pub detail: Option<String>,
}

/// The complete, atomically-mutated state of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRecord {
    pub settings: GroupSettings,
    pub members: BTreeMap<String, MemberRecord>,
    pub stats: GroupStats,
    /// Newest entries at the back.
    pub audit_log: VecDeque<AuditEntry>,
}

impl GroupRecord {
    /// Snapshot of a member, defaulting when the member was never seen.
    pub fn member(&self, member_id: &str) -> MemberRecord {
        self.members.get(member_id).cloned().unwrap_or_default()
    }

    pub fn member_mut(&mut self, member_id: &str) -> &mut MemberRecord {
        self.members.entry(member_id.to_string()).or_default()
    }

    pub fn rank_of(&self, member_id: &str) -> Rank {
        self.members
            .get(member_id)
            .map(|m| m.rank)
            .unwrap_or_default()
    }

    /// Append an audit entry, dropping the oldest ones beyond `limit`.
    pub fn push_audit(
        &mut self,
        limit: usize,
        actor_id: &str,
        target_id: Option<&str>,
        action: AuditAction,
        detail: Option<String>,
    ) {
        if limit == 0 {
            return;
        }
        self.audit_log.push_back(AuditEntry {
            id: Uuid::new_v4(),
            at: Utc::now(),
            actor_id: actor_id.to_string(),
            target_id: target_id.map(str::to_string),
            action,
            detail,
        });
        while self.audit_log.len() > limit {
            self.audit_log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let s = GroupSettings::default();
        assert!(s.get(SettingKey::Moderation));
        assert!(s.get(SettingKey::AutoDelete));
        assert!(s.get(SettingKey::Welcome));
        assert!(!s.get(SettingKey::Goodbye));
        assert_eq!(s.text(TextField::Rules), DEFAULT_RULES);
        assert_eq!(s.text(TextField::WelcomeMessage), DEFAULT_WELCOME_MESSAGE);
    }

    #[test]
    fn test_setting_key_parse() {
        assert_eq!(SettingKey::parse("autodelete"), Some(SettingKey::AutoDelete));
        assert_eq!(
            SettingKey::parse("auto_delete_enabled"),
            Some(SettingKey::AutoDelete)
        );
        assert_eq!(SettingKey::parse("Moderation"), Some(SettingKey::Moderation));
        assert_eq!(SettingKey::parse("language"), None);
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::parse(key.as_str()), Some(key));
        }
    }

    #[test]
    fn test_text_field_parse() {
        assert_eq!(TextField::parse("rules"), Some(TextField::Rules));
        assert_eq!(TextField::parse("welcome"), Some(TextField::WelcomeMessage));
        assert_eq!(
            TextField::parse("goodbye_message"),
            Some(TextField::GoodbyeMessage)
        );
        assert_eq!(TextField::parse("motd"), None);
    }

    #[test]
    fn test_absent_member_is_default() {
        let record = GroupRecord::default();
        assert_eq!(record.member("nobody"), MemberRecord::default());
        assert_eq!(record.rank_of("nobody"), Rank::REGULAR);
        assert!(record.members.is_empty());
    }

    #[test]
    fn test_member_mut_creates_lazily() {
        let mut record = GroupRecord::default();
        record.member_mut("m1").warning_count += 1;
        assert_eq!(record.member("m1").warning_count, 1);
        assert_eq!(record.rank_of("m1"), Rank::REGULAR);
    }

    #[test]
    fn test_audit_log_is_capped() {
        let mut record = GroupRecord::default();
        for i in 0..5 {
            record.push_audit(3, &format!("a{i}"), None, AuditAction::Warn, None);
        }
        assert_eq!(record.audit_log.len(), 3);
        assert_eq!(record.audit_log.front().unwrap().actor_id, "a2");
        assert_eq!(record.audit_log.back().unwrap().actor_id, "a4");

        record.push_audit(0, "ignored", None, AuditAction::Warn, None);
        assert_eq!(record.audit_log.len(), 3);
    }

    #[test]
    fn test_record_tolerates_missing_fields() {
        let record: GroupRecord =
            serde_json::from_str(r#"{"members":{"m1":{"rank":50}}}"#).unwrap();
        assert_eq!(record.rank_of("m1"), Rank::MODERATOR);
        assert_eq!(record.member("m1").warning_count, 0);
        assert!(record.settings.moderation_enabled);
        assert_eq!(record.stats, GroupStats::default());
    }
}
