use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{info, warn};

use super::errors::{AuthError, EngineError};
use super::group_engine::{GroupEngine, invalid};
use super::ledger::resolve_target;
use super::permissions::{Command, Rank};
use super::records::{AuditAction, GroupSettings};
use super::validation;

/// Warnings at which a member is automatically restricted.
pub const WARNING_THRESHOLD: u32 = 3;

pub const DEFAULT_WARNING_REASON: &str = "Inappropriate behavior";

/// Placeholder word list shipped with the bot; real deployments override it
/// with `[moderation] patterns`.
pub fn default_patterns() -> Vec<String> {
    vec![r"\b(badword1|badword2|badword3)\b".to_string()]
}

/// Pattern-match provider consulted by the content screen.
pub trait ContentFilter: Send + Sync {
    /// A human-readable reason when `text` violates policy.
    fn matches(&self, text: &str) -> Option<String>;
}

/// Case-insensitive regular expressions.
pub struct PatternFilter {
    patterns: Vec<Regex>,
}

impl PatternFilter {
    pub fn new(patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    #[cfg(test)]
    pub fn default_terms() -> Self {
        Self::new(&default_patterns()).expect("built-in patterns are valid")
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl ContentFilter for PatternFilter {
    fn matches(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| format!("Contains inappropriate term: {}", m.as_str()))
    }
}

/// Outcome of screening one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum Action {
    Allow,
    /// Post a warning notice; the message stands.
    Flag(String),
    /// Delete the message and post a notice.
    Remove(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarningOutcome {
    pub count: u32,
    pub auto_restricted: bool,
}

/// Where a member sits on the warning escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "count", rename_all = "snake_case")]
pub enum WarningState {
    Clean,
    Warned(u32),
    AutoRestricted,
}

impl WarningState {
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => Self::Clean,
            n if n < WARNING_THRESHOLD => Self::Warned(n),
            _ => Self::AutoRestricted,
        }
    }
}

/// Lowercase alphanumeric words joined by single spaces, padded with a
/// space on each side so whole-word containment is a substring test.
fn word_form(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn blocked_term_match(terms: &[String], text: &str) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    let haystack = word_form(text);
    terms.iter().find_map(|term| {
        let needle = word_form(term);
        (!needle.trim().is_empty() && haystack.contains(&needle))
            .then(|| format!("Contains blocked term: {term}"))
    })
}

/// Evaluate text against group policy. Pure; never touches counters.
pub fn screen(settings: &GroupSettings, filter: &dyn ContentFilter, text: &str) -> Action {
    if !settings.moderation_enabled {
        return Action::Allow;
    }
    let reason = filter
        .matches(text)
        .or_else(|| blocked_term_match(&settings.blocked_terms, text));
    match reason {
        None => Action::Allow,
        Some(reason) if settings.auto_delete_enabled => Action::Remove(reason),
        Some(reason) => Action::Flag(reason),
    }
}

impl GroupEngine {
    /// Issue a warning. Increments the member's count and the group's
    /// `warnings_issued` in one commit; crossing the threshold also drops
    /// the member to `restricted` in that same commit.
    pub async fn record_warning(
        &self,
        group_id: &str,
        actor_id: &str,
        target_id: &str,
        reason: &str,
    ) -> Result<WarningOutcome, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_member_id(actor_id).map_err(invalid)?;
        validation::validate_member_id(target_id).map_err(|_| AuthError::UnknownTarget)?;
        validation::validate_reason(reason).map_err(invalid)?;
        let reason = match reason.trim() {
            "" => DEFAULT_WARNING_REASON,
            r => r,
        };
        let limit = self.audit_log_limit;

        let outcome = self
            .store
            .with_group(group_id, |record| {
                resolve_target(record, actor_id, target_id, Command::Warn.min_rank())?;

                let member = record.member_mut(target_id);
                member.warning_count = member.warning_count.saturating_add(1);
                let count = member.warning_count;
                let auto_restricted = count == WARNING_THRESHOLD && member.rank > Rank::RESTRICTED;
                if auto_restricted {
                    member.rank = Rank::RESTRICTED;
                }
                record.stats.warnings_issued += 1;

                record.push_audit(
                    limit,
                    actor_id,
                    Some(target_id),
                    AuditAction::Warn,
                    Some(format!("{reason} ({count}/{WARNING_THRESHOLD})")),
                );
                if auto_restricted {
                    record.push_audit(limit, actor_id, Some(target_id), AuditAction::AutoRestrict, None);
                }
                Ok::<_, EngineError>(WarningOutcome {
                    count,
                    auto_restricted,
                })
            })
            .await?;

        if outcome.auto_restricted {
            info!(%group_id, %target_id, count = outcome.count, "member auto-restricted");
        } else {
            info!(%group_id, %actor_id, %target_id, count = outcome.count, "warning issued");
        }
        Ok(outcome)
    }

    pub async fn warning_state(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<WarningState, EngineError> {
        let member = self.member(group_id, member_id).await?;
        Ok(WarningState::from_count(member.warning_count))
    }

    /// Read-only content screen against the group's current settings.
    pub async fn screen_message(&self, group_id: &str, text: &str) -> Result<Action, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        let record = self.store.read_group(group_id).await?;
        Ok(screen(&record.settings, self.filter.as_ref(), text))
    }

    /// Full pipeline for an inbound non-command message: counts it, removes
    /// anything sent by a banned member, then applies the content screen.
    pub async fn inspect_message(
        &self,
        group_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Action, EngineError> {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_member_id(sender_id).map_err(invalid)?;
        let filter = self.filter.as_ref();

        let action = self
            .store
            .with_group(group_id, |record| {
                record.stats.message_count += 1;
                if record.rank_of(sender_id) <= Rank::BANNED {
                    return Ok::<_, EngineError>(Action::Remove("banned member".to_string()));
                }
                Ok(screen(&record.settings, filter, text))
            })
            .await?;

        if action != Action::Allow {
            warn!(%group_id, %sender_id, ?action, "message screened");
        }
        Ok(action)
    }
}
