/// Maximum length of a group or member id.
pub const MAX_ID_LENGTH: usize = 64;

/// Maximum length of welcome/goodbye messages and rules.
pub const MAX_TEXT_LENGTH: usize = 4000;

/// Maximum length of a warning reason.
pub const MAX_REASON_LENGTH: usize = 500;

/// Maximum length of one blocked term.
pub const MAX_TERM_LENGTH: usize = 64;

/// Maximum number of blocked terms per group.
pub const MAX_BLOCKED_TERMS: usize = 200;

fn validate_id(kind: &str, id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{kind} id cannot be empty"));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(format!("{kind} id too long (max {MAX_ID_LENGTH} characters)"));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("{kind} id cannot contain whitespace"));
    }
    Ok(())
}

/// Platform chat ids: non-empty, no whitespace, at most 64 bytes.
pub fn validate_group_id(id: &str) -> Result<(), String> {
    validate_id("Group", id)
}

pub fn validate_member_id(id: &str) -> Result<(), String> {
    validate_id("Member", id)
}

/// Free-text settings must be non-blank and under the length limit.
pub fn validate_text(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Text cannot be empty".into());
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(format!("Text too long (max {MAX_TEXT_LENGTH} characters)"));
    }
    Ok(())
}

pub fn validate_reason(reason: &str) -> Result<(), String> {
    if reason.len() > MAX_REASON_LENGTH {
        return Err(format!(
            "Reason too long (max {MAX_REASON_LENGTH} characters)"
        ));
    }
    Ok(())
}

/// Blocked terms need at least one alphanumeric character to ever match.
pub fn validate_blocked_term(term: &str) -> Result<(), String> {
    if !term.chars().any(|c| c.is_alphanumeric()) {
        return Err("Blocked term must contain a letter or digit".into());
    }
    if term.len() > MAX_TERM_LENGTH {
        return Err(format!(
            "Blocked term too long (max {MAX_TERM_LENGTH} characters)"
        ));
    }
    Ok(())
}
