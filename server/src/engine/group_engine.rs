use std::sync::Arc;

use tracing::info;

use super::errors::EngineError;
use super::ledger::check_rank;
use super::moderation::ContentFilter;
use super::permissions::{Command, Rank, available_commands};
use super::records::{
    AuditAction, AuditEntry, GroupSettings, GroupStats, MemberRecord, SettingKey, TextField,
};
use super::store::GroupStore;
use super::validation;

pub const DEFAULT_AUDIT_LOG_LIMIT: usize = 100;

/// The single authority for group permissions, moderation and settings.
/// Transport adapters (HTTP, CLI, chat platforms) translate their events
/// into calls on this type.
///
/// Rank changes live in `ledger.rs`, warnings and message screening in
/// `moderation.rs`; this file holds construction, settings and reporting.
pub struct GroupEngine {
    pub(super) store: GroupStore,
    pub(super) filter: Arc<dyn ContentFilter>,
    pub(super) audit_log_limit: usize,
}

pub(super) fn invalid(e: String) -> EngineError {
    EngineError::InvalidInput(e)
}

impl GroupEngine {
    pub fn new(store: GroupStore, filter: Arc<dyn ContentFilter>) -> Self {
        Self {
            store,
            filter,
            audit_log_limit: DEFAULT_AUDIT_LOG_LIMIT,
        }
    }

    pub fn with_audit_log_limit(mut self, limit: usize) -> Self {
        self.audit_log_limit = limit;
        self
    }

    /// Release cached records of groups with no operation in flight.
    pub fn evict_idle_groups(&self) -> usize {
        self.store.evict_idle()
    }

    // ── Ranks (unchecked) ───────────────────────────────────────────

    /// A member's rank; `regular` for members the group has never seen.
    pub async fn rank_of(&self, group_id: &str, member_id: &str) -> Result<Rank, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        let record = self.store.read_group(group_id).await?;
        Ok(record.rank_of(member_id))
    }

    pub async fn member(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<MemberRecord, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        let record = self.store.read_group(group_id).await?;
        Ok(record.member(member_id))
    }

    /// Set a rank without any authorization check. For platform-trusted
    /// callers only (startup seeding, syncing the platform's admin list).
    pub async fn set_rank(
        &self,
        group_id: &str,
        member_id: &str,
        rank: Rank,
    ) -> Result<(), EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_member_id(member_id).map_err(invalid)?;
        self.store
            .with_group(group_id, |record| {
                record.member_mut(member_id).rank = rank;
                Ok::<_, EngineError>(())
            })
            .await?;
        info!(%group_id, %member_id, %rank, "rank set");
        Ok(())
    }

    /// Initialise a group's ranks from the platform: the creator becomes
    /// `owner` and the listed administrators `admin`, in one commit.
    pub async fn bootstrap_group(
        &self,
        group_id: &str,
        owner_id: &str,
        admin_ids: &[String],
    ) -> Result<(), EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_member_id(owner_id).map_err(invalid)?;
        for admin in admin_ids {
            validation::validate_member_id(admin).map_err(invalid)?;
        }
        self.store
            .with_group(group_id, |record| {
                for admin in admin_ids.iter().filter(|a| a.as_str() != owner_id) {
                    record.member_mut(admin).rank = Rank::ADMIN;
                }
                record.member_mut(owner_id).rank = Rank::OWNER;
                Ok::<_, EngineError>(())
            })
            .await?;
        info!(%group_id, %owner_id, admins = admin_ids.len(), "group permissions initialized");
        Ok(())
    }

    /// Commands the member may run in this group.
    pub async fn available_commands(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<Vec<Command>, EngineError> {
        Ok(available_commands(self.rank_of(group_id, member_id).await?))
    }

    // ── Settings ────────────────────────────────────────────────────

    pub async fn settings(&self, group_id: &str) -> Result<GroupSettings, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        Ok(self.store.read_group(group_id).await?.settings)
    }

    pub async fn get_setting(&self, group_id: &str, key: SettingKey) -> Result<bool, EngineError> {
        Ok(self.settings(group_id).await?.get(key))
    }

    pub async fn set_setting(
        &self,
        group_id: &str,
        key: SettingKey,
        value: bool,
    ) -> Result<(), EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        self.store
            .with_group(group_id, |record| {
                record.settings.set(key, value);
                Ok::<_, EngineError>(())
            })
            .await
    }

    pub async fn get_text(&self, group_id: &str, field: TextField) -> Result<String, EngineError> {
        Ok(self.settings(group_id).await?.text(field).to_string())
    }

    pub async fn set_text(
        &self,
        group_id: &str,
        field: TextField,
        value: String,
    ) -> Result<(), EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_text(&value).map_err(invalid)?;
        self.store
            .with_group(group_id, move |record| {
                record.settings.set_text(field, value);
                Ok::<_, EngineError>(())
            })
            .await
    }

    /// `set_setting` on behalf of a member, who needs the `/settings` rank.
    pub async fn configure_setting(
        &self,
        group_id: &str,
        actor_id: &str,
        key: SettingKey,
        value: bool,
    ) -> Result<(), EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        let limit = self.audit_log_limit;
        self.store
            .with_group(group_id, |record| {
                check_rank(record.rank_of(actor_id), Command::Settings.min_rank())?;
                record.settings.set(key, value);
                let state = if value { "on" } else { "off" };
                record.push_audit(
                    limit,
                    actor_id,
                    None,
                    AuditAction::SettingChanged,
                    Some(format!("{key} {state}")),
                );
                Ok::<_, EngineError>(())
            })
            .await?;
        info!(%group_id, %actor_id, %key, value, "setting changed");
        Ok(())
    }

    /// `set_text` on behalf of a member. Rules need the `/rules` rank,
    /// welcome and goodbye messages the `/welcome` rank.
    pub async fn configure_text(
        &self,
        group_id: &str,
        actor_id: &str,
        field: TextField,
        value: String,
    ) -> Result<(), EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_text(&value).map_err(invalid)?;
        let command = match field {
            TextField::Rules => Command::Rules,
            TextField::WelcomeMessage | TextField::GoodbyeMessage => Command::Welcome,
        };
        let limit = self.audit_log_limit;
        self.store
            .with_group(group_id, move |record| {
                check_rank(record.rank_of(actor_id), command.min_rank())?;
                record.settings.set_text(field, value);
                record.push_audit(
                    limit,
                    actor_id,
                    None,
                    AuditAction::TextChanged,
                    Some(field.to_string()),
                );
                Ok::<_, EngineError>(())
            })
            .await?;
        info!(%group_id, %actor_id, %field, "text setting changed");
        Ok(())
    }

    /// Add a keyword to the group's blocked list. Returns false if it was
    /// already present.
    pub async fn add_blocked_term(
        &self,
        group_id: &str,
        actor_id: &str,
        term: &str,
    ) -> Result<bool, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_blocked_term(term).map_err(invalid)?;
        let term = term.trim().to_lowercase();
        let limit = self.audit_log_limit;
        self.store
            .with_group(group_id, |record| {
                check_rank(record.rank_of(actor_id), Command::Settings.min_rank())?;
                let terms = &mut record.settings.blocked_terms;
                if terms.contains(&term) {
                    return Ok(false);
                }
                if terms.len() >= validation::MAX_BLOCKED_TERMS {
                    return Err(invalid(format!(
                        "Too many blocked terms (max {})",
                        validation::MAX_BLOCKED_TERMS
                    )));
                }
                terms.push(term.clone());
                record.push_audit(
                    limit,
                    actor_id,
                    None,
                    AuditAction::SettingChanged,
                    Some(format!("blocked term added: {term}")),
                );
                Ok(true)
            })
            .await
    }

    /// Returns false if the term was not on the list.
    pub async fn remove_blocked_term(
        &self,
        group_id: &str,
        actor_id: &str,
        term: &str,
    ) -> Result<bool, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        let term = term.trim().to_lowercase();
        let limit = self.audit_log_limit;
        self.store
            .with_group(group_id, |record| {
                check_rank(record.rank_of(actor_id), Command::Settings.min_rank())?;
                let before = record.settings.blocked_terms.len();
                record.settings.blocked_terms.retain(|t| *t != term);
                if record.settings.blocked_terms.len() == before {
                    return Ok::<_, EngineError>(false);
                }
                record.push_audit(
                    limit,
                    actor_id,
                    None,
                    AuditAction::SettingChanged,
                    Some(format!("blocked term removed: {term}")),
                );
                Ok(true)
            })
            .await
    }

    // ── Reporting ───────────────────────────────────────────────────

    pub async fn stats(&self, group_id: &str) -> Result<GroupStats, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        Ok(self.store.read_group(group_id).await?.stats)
    }

    /// Most recent audit entries, newest first.
    pub async fn audit_log(
        &self,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        let record = self.store.read_group(group_id).await?;
        Ok(record.audit_log.into_iter().rev().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::backend::MemoryBackend;
    use crate::engine::errors::AuthError;
    use crate::engine::moderation::PatternFilter;
    use crate::engine::records::{DEFAULT_RULES, DEFAULT_WELCOME_MESSAGE};

    fn setup_engine() -> (GroupEngine, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = GroupStore::new(backend.clone(), Duration::from_secs(5));
        let filter = Arc::new(PatternFilter::default_terms());
        (GroupEngine::new(store, filter), backend)
    }

    #[tokio::test]
    async fn test_unknown_member_is_regular() {
        let (engine, backend) = setup_engine();
        assert_eq!(engine.rank_of("g1", "ghost").await.unwrap(), Rank::REGULAR);
        assert_eq!(backend.save_count(), 0);
    }

    #[tokio::test]
    async fn test_set_rank_and_read_back() {
        let (engine, _) = setup_engine();
        engine.set_rank("g1", "m1", Rank::TRUSTED).await.unwrap();
        assert_eq!(engine.rank_of("g1", "m1").await.unwrap(), Rank::TRUSTED);
        assert_eq!(engine.rank_of("g2", "m1").await.unwrap(), Rank::REGULAR);
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let (engine, _) = setup_engine();
        assert!(matches!(
            engine.rank_of("", "m1").await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.set_rank("g1", "bad id", Rank::ADMIN).await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_group() {
        let (engine, backend) = setup_engine();
        engine
            .bootstrap_group("g1", "creator", &["a1".into(), "a2".into(), "creator".into()])
            .await
            .unwrap();
        assert_eq!(engine.rank_of("g1", "creator").await.unwrap(), Rank::OWNER);
        assert_eq!(engine.rank_of("g1", "a1").await.unwrap(), Rank::ADMIN);
        assert_eq!(engine.rank_of("g1", "a2").await.unwrap(), Rank::ADMIN);
        assert_eq!(backend.save_count(), 1);
    }

    #[tokio::test]
    async fn test_setting_roundtrip_and_defaults() {
        let (engine, _) = setup_engine();
        assert!(engine.get_setting("g1", SettingKey::Moderation).await.unwrap());
        assert!(!engine.get_setting("g1", SettingKey::Goodbye).await.unwrap());

        engine
            .set_setting("g1", SettingKey::Moderation, false)
            .await
            .unwrap();
        engine
            .set_setting("g1", SettingKey::Goodbye, true)
            .await
            .unwrap();
        assert!(!engine.get_setting("g1", SettingKey::Moderation).await.unwrap());
        assert!(engine.get_setting("g1", SettingKey::Goodbye).await.unwrap());
        // Untouched keys keep their defaults.
        assert!(engine.get_setting("g1", SettingKey::AutoDelete).await.unwrap());
    }

    #[tokio::test]
    async fn test_text_roundtrip_and_defaults() {
        let (engine, _) = setup_engine();
        assert_eq!(
            engine.get_text("g1", TextField::Rules).await.unwrap(),
            DEFAULT_RULES
        );
        assert_eq!(
            engine.get_text("g1", TextField::WelcomeMessage).await.unwrap(),
            DEFAULT_WELCOME_MESSAGE
        );

        engine
            .set_text("g1", TextField::Rules, "1. Be kind".into())
            .await
            .unwrap();
        assert_eq!(
            engine.get_text("g1", TextField::Rules).await.unwrap(),
            "1. Be kind"
        );
        assert!(matches!(
            engine.set_text("g1", TextField::Rules, "  ".into()).await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_configure_setting_requires_admin() {
        let (engine, _) = setup_engine();
        engine.set_rank("g1", "mod", Rank::MODERATOR).await.unwrap();
        engine.set_rank("g1", "adm", Rank::ADMIN).await.unwrap();

        let err = engine
            .configure_setting("g1", "mod", SettingKey::AutoDelete, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.auth(),
            Some(AuthError::InsufficientRank { .. })
        ));
        assert!(engine.get_setting("g1", SettingKey::AutoDelete).await.unwrap());

        engine
            .configure_setting("g1", "adm", SettingKey::AutoDelete, false)
            .await
            .unwrap();
        assert!(!engine.get_setting("g1", SettingKey::AutoDelete).await.unwrap());

        let log = engine.audit_log("g1", 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, AuditAction::SettingChanged);
        assert_eq!(log[0].detail.as_deref(), Some("autodelete off"));
    }

    #[tokio::test]
    async fn test_configure_rules_allowed_for_moderator() {
        let (engine, _) = setup_engine();
        engine.set_rank("g1", "mod", Rank::MODERATOR).await.unwrap();

        engine
            .configure_text("g1", "mod", TextField::Rules, "No spam".into())
            .await
            .unwrap();
        assert_eq!(engine.get_text("g1", TextField::Rules).await.unwrap(), "No spam");

        let err = engine
            .configure_text("g1", "mod", TextField::WelcomeMessage, "Hi!".into())
            .await
            .unwrap_err();
        assert!(err.auth().is_some());
    }

    #[tokio::test]
    async fn test_blocked_terms() {
        let (engine, _) = setup_engine();
        engine.set_rank("g1", "adm", Rank::ADMIN).await.unwrap();

        assert!(engine.add_blocked_term("g1", "adm", "Spam").await.unwrap());
        assert!(!engine.add_blocked_term("g1", "adm", "spam").await.unwrap());
        assert_eq!(
            engine.settings("g1").await.unwrap().blocked_terms,
            vec!["spam".to_string()]
        );

        assert!(engine.add_blocked_term("g1", "nobody", "eggs").await.is_err());
        assert!(engine.remove_blocked_term("g1", "adm", "SPAM").await.unwrap());
        assert!(!engine.remove_blocked_term("g1", "adm", "spam").await.unwrap());
    }

    #[tokio::test]
    async fn test_available_commands_follow_rank() {
        let (engine, _) = setup_engine();
        engine.set_rank("g1", "mod", Rank::MODERATOR).await.unwrap();
        let cmds = engine.available_commands("g1", "mod").await.unwrap();
        assert!(cmds.contains(&Command::Warn));
        assert!(!cmds.contains(&Command::Promote));
    }

    #[tokio::test]
    async fn test_audit_log_limit() {
        let (engine, _) = setup_engine();
        let engine = engine.with_audit_log_limit(2);
        engine.set_rank("g1", "adm", Rank::ADMIN).await.unwrap();
        for key in [SettingKey::Welcome, SettingKey::Goodbye, SettingKey::Moderation] {
            engine
                .configure_setting("g1", "adm", key, true)
                .await
                .unwrap();
        }
        let log = engine.audit_log("g1", 10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].detail.as_deref(), Some("moderation on"));
        assert_eq!(log[1].detail.as_deref(), Some("goodbye on"));
    }
}
