use tracing::info;

use super::errors::{AuthError, EngineError};
use super::group_engine::{GroupEngine, invalid};
use super::permissions::{Command, Rank};
use super::records::{AuditAction, GroupRecord};
use super::validation;

/// True iff the actor meets the minimum and strictly outranks the target.
pub fn authorize(actor: Rank, target: Rank, minimum: Rank) -> bool {
    actor >= minimum && actor > target
}

pub fn check_rank(actor: Rank, minimum: Rank) -> Result<(), AuthError> {
    if actor < minimum {
        return Err(AuthError::InsufficientRank {
            actor,
            required: minimum,
        });
    }
    Ok(())
}

/// `authorize` with a reason. The minimum is checked first.
pub fn check_authority(actor: Rank, target: Rank, minimum: Rank) -> Result<(), AuthError> {
    check_rank(actor, minimum)?;
    if actor <= target {
        return Err(AuthError::CannotActOnEqualOrHigher { actor, target });
    }
    Ok(())
}

/// Members below moderator step up to moderator; everyone else to admin.
/// Never lowers a rank.
pub fn promotion_target(current: Rank) -> Rank {
    let step = if current < Rank::MODERATOR {
        Rank::MODERATOR
    } else {
        Rank::ADMIN
    };
    step.max(current)
}

/// Staff drop to regular; everyone else to restricted.
pub fn demotion_target(current: Rank) -> Rank {
    if current >= Rank::MODERATOR {
        Rank::REGULAR
    } else {
        Rank::RESTRICTED
    }
}

/// Authorize `actor_id` against `target_id` within one record snapshot and
/// return the target's current rank. Acting on yourself is always refused.
pub(super) fn resolve_target(
    record: &GroupRecord,
    actor_id: &str,
    target_id: &str,
    minimum: Rank,
) -> Result<Rank, AuthError> {
    let actor = record.rank_of(actor_id);
    check_rank(actor, minimum)?;
    if actor_id == target_id {
        return Err(AuthError::CannotActOnEqualOrHigher {
            actor,
            target: actor,
        });
    }
    let target = record.rank_of(target_id);
    check_authority(actor, target, minimum)?;
    Ok(target)
}

fn audit_action(command: Command) -> AuditAction {
    match command {
        Command::Promote => AuditAction::Promote,
        Command::Demote => AuditAction::Demote,
        Command::Ban => AuditAction::Ban,
        Command::Unban => AuditAction::Unban,
        Command::Mute => AuditAction::Mute,
        Command::Unmute => AuditAction::Unmute,
        _ => AuditAction::SettingChanged,
    }
}

impl GroupEngine {
    /// Shared path for every rank-changing moderation command. The check,
    /// the new rank and the audit entry all come from one commit. `next`
    /// gets the actor's and the target's current ranks.
    async fn change_rank<F>(
        &self,
        group_id: &str,
        actor_id: &str,
        target_id: &str,
        command: Command,
        next: F,
    ) -> Result<Rank, EngineError>
    where
        F: FnOnce(Rank, Rank) -> Result<Rank, EngineError>,
    {
        validation::validate_group_id(group_id).map_err(invalid)?;
        validation::validate_member_id(actor_id).map_err(invalid)?;
        validation::validate_member_id(target_id).map_err(|_| AuthError::UnknownTarget)?;
        let limit = self.audit_log_limit;

        let (from, to) = self
            .store
            .with_group(group_id, |record| {
                let from = resolve_target(record, actor_id, target_id, command.min_rank())?;
                let to = next(record.rank_of(actor_id), from)?;
                record.member_mut(target_id).rank = to;
                if command == Command::Ban {
                    record.stats.users_banned += 1;
                }
                record.push_audit(
                    limit,
                    actor_id,
                    Some(target_id),
                    audit_action(command),
                    Some(format!("{from} -> {to}")),
                );
                Ok::<_, EngineError>((from, to))
            })
            .await?;

        info!(%group_id, %actor_id, %target_id, command = command.as_str(), %from, %to, "rank changed");
        Ok(to)
    }

    /// One step up the staff ladder. Returns the new rank.
    pub async fn promote(
        &self,
        group_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<Rank, EngineError> {
        self.change_rank(group_id, actor_id, target_id, Command::Promote, |_, current| {
            Ok(promotion_target(current))
        })
        .await
    }

    /// One step down. Never raises a rank, so a banned member stays banned.
    pub async fn demote(
        &self,
        group_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<Rank, EngineError> {
        self.change_rank(group_id, actor_id, target_id, Command::Demote, |_, current| {
            Ok(demotion_target(current).min(current))
        })
        .await
    }

    /// The rank-changing commands below all return the target's new rank.
    pub async fn ban(&self, group_id: &str, actor_id: &str, target_id: &str) -> Result<Rank, EngineError> {
        self.change_rank(group_id, actor_id, target_id, Command::Ban, |_, _| Ok(Rank::BANNED))
            .await
    }

    /// Lift a ban, restoring `restored`. Ranks are not historized, so the
    /// caller picks the rank; it must stay below the actor's own. Only
    /// banned members can be unbanned.
    pub async fn unban(
        &self,
        group_id: &str,
        actor_id: &str,
        target_id: &str,
        restored: Rank,
    ) -> Result<Rank, EngineError> {
        self.change_rank(group_id, actor_id, target_id, Command::Unban, |actor, current| {
            if current > Rank::BANNED {
                return Err(invalid("Member is not banned".into()));
            }
            if restored >= actor {
                return Err(AuthError::CannotActOnEqualOrHigher {
                    actor,
                    target: restored,
                }
                .into());
            }
            Ok(restored)
        })
        .await
    }

    /// Restrict a member. Banned members are left to `unban`.
    pub async fn mute(&self, group_id: &str, actor_id: &str, target_id: &str) -> Result<Rank, EngineError> {
        self.change_rank(group_id, actor_id, target_id, Command::Mute, |_, current| {
            if current <= Rank::BANNED {
                return Err(invalid("Member is banned".into()));
            }
            Ok(Rank::RESTRICTED.min(current))
        })
        .await
    }

    /// Lift a mute. Only restricted members qualify; a ban needs `unban`.
    pub async fn unmute(&self, group_id: &str, actor_id: &str, target_id: &str) -> Result<Rank, EngineError> {
        self.change_rank(group_id, actor_id, target_id, Command::Unmute, |_, current| {
            if current <= Rank::BANNED {
                return Err(invalid("Member is banned".into()));
            }
            if current > Rank::RESTRICTED {
                return Err(invalid("Member is not muted".into()));
            }
            Ok(Rank::REGULAR)
        })
        .await
    }
}
