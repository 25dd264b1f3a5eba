use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A member's permission tier within a group.
///
/// Ranks are plain integers on a fixed total order. The named tiers below are
/// the only values the engine assigns on its own; any other integer is a
/// legal (unnamed) rank and compares numerically.
/// Stored as a bare integer in persisted records.
/// `Default` is `REGULAR`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rank(pub i32);

impl Rank {
    pub const BANNED: Rank = Rank(-100);
    pub const RESTRICTED: Rank = Rank(-10);
    pub const REGULAR: Rank = Rank(0);
    pub const TRUSTED: Rank = Rank(10);
    pub const MODERATOR: Rank = Rank(50);
    pub const ADMIN: Rank = Rank(100);
    pub const OWNER: Rank = Rank(1000);

    /// Every named tier, lowest first.
    pub const NAMED: [Rank; 7] = [
        Rank::BANNED,
        Rank::RESTRICTED,
        Rank::REGULAR,
        Rank::TRUSTED,
        Rank::MODERATOR,
        Rank::ADMIN,
        Rank::OWNER,
    ];

    pub fn value(self) -> i32 {
        self.0
    }

    /// Tier name, or `None` for ranks between tiers.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Rank::BANNED => Some("banned"),
            Rank::RESTRICTED => Some("restricted"),
            Rank::REGULAR => Some("regular"),
            Rank::TRUSTED => Some("trusted"),
            Rank::MODERATOR => Some("moderator"),
            Rank::ADMIN => Some("admin"),
            Rank::OWNER => Some("owner"),
            _ => None,
        }
    }

    /// Parse a tier name (case-insensitive) or a raw integer.
    pub fn parse(s: &str) -> Option<Rank> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "banned" => Some(Rank::BANNED),
            "restricted" | "muted" => Some(Rank::RESTRICTED),
            "regular" | "member" => Some(Rank::REGULAR),
            "trusted" => Some(Rank::TRUSTED),
            "moderator" | "mod" => Some(Rank::MODERATOR),
            "admin" => Some(Rank::ADMIN),
            "owner" => Some(Rank::OWNER),
            other => other.parse::<i32>().ok().map(Rank),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "rank({})", self.0),
        }
    }
}

impl FromStr for Rank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rank::parse(s).ok_or_else(|| format!("Unknown rank: {s}"))
    }
}

// ── Command table ───────────────────────────────────────────

/// Group commands known to the engine, with the minimum rank each requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Help,
    Stats,
    Rules,
    Warn,
    Mute,
    Unmute,
    Welcome,
    Settings,
    Promote,
    Demote,
    Ban,
    Unban,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::Start,
        Command::Help,
        Command::Stats,
        Command::Rules,
        Command::Warn,
        Command::Mute,
        Command::Unmute,
        Command::Welcome,
        Command::Settings,
        Command::Promote,
        Command::Demote,
        Command::Ban,
        Command::Unban,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('/');
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Stats => "stats",
            Self::Rules => "rules",
            Self::Warn => "warn",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Welcome => "welcome",
            Self::Settings => "settings",
            Self::Promote => "promote",
            Self::Demote => "demote",
            Self::Ban => "ban",
            Self::Unban => "unban",
        }
    }

    /// Minimum rank needed to run the command. For `Rules` this is the rank
    /// needed to change the rules; reading them is open to everyone.
    pub fn min_rank(&self) -> Rank {
        match self {
            Self::Start | Self::Help | Self::Stats => Rank::REGULAR,
            Self::Rules | Self::Warn | Self::Mute | Self::Unmute => Rank::MODERATOR,
            Self::Welcome | Self::Settings | Self::Promote | Self::Demote | Self::Ban | Self::Unban => {
                Rank::ADMIN
            }
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Start => "Introduces the bot and its capabilities",
            Self::Help => "Shows available commands and usage information",
            Self::Stats => "View group statistics",
            Self::Rules => "Set or view group rules",
            Self::Warn => "Warn a user about inappropriate behavior",
            Self::Mute => "Mute a user",
            Self::Unmute => "Unmute a previously muted user",
            Self::Welcome => "Set or view the welcome message for new members",
            Self::Settings => "Configure bot settings for the group",
            Self::Promote => "Promote a user to a higher permission level",
            Self::Demote => "Demote a user to a lower permission level",
            Self::Ban => "Ban a user from the group",
            Self::Unban => "Unban a previously banned user",
        }
    }
}

/// Commands a member of the given rank may run, in table order.
pub fn available_commands(rank: Rank) -> Vec<Command> {
    Command::ALL
        .into_iter()
        .filter(|c| rank >= c.min_rank())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_ordering() {
        assert!(Rank::OWNER > Rank::ADMIN);
        assert!(Rank::ADMIN > Rank::MODERATOR);
        assert!(Rank::MODERATOR > Rank::TRUSTED);
        assert!(Rank::TRUSTED > Rank::REGULAR);
        assert!(Rank::REGULAR > Rank::RESTRICTED);
        assert!(Rank::RESTRICTED > Rank::BANNED);
        let mut sorted = Rank::NAMED;
        sorted.sort();
        assert_eq!(sorted, Rank::NAMED);
    }

    #[test]
    fn test_rank_parse() {
        assert_eq!(Rank::parse("owner"), Some(Rank::OWNER));
        assert_eq!(Rank::parse("Admin"), Some(Rank::ADMIN));
        assert_eq!(Rank::parse("mod"), Some(Rank::MODERATOR));
        assert_eq!(Rank::parse("muted"), Some(Rank::RESTRICTED));
        assert_eq!(Rank::parse("-100"), Some(Rank::BANNED));
        assert_eq!(Rank::parse("25"), Some(Rank(25)));
        assert_eq!(Rank::parse("wizard"), None);
        assert!("wizard".parse::<Rank>().is_err());
    }

    #[test]
    fn test_rank_names_roundtrip() {
        for rank in Rank::NAMED {
            let name = rank.name().unwrap();
            assert_eq!(Rank::parse(name), Some(rank));
            assert_eq!(rank.to_string(), name);
        }
        assert_eq!(Rank(25).name(), None);
        assert_eq!(Rank(25).to_string(), "rank(25)");
    }

    #[test]
    fn test_rank_default_is_regular() {
        assert_eq!(Rank::default(), Rank::REGULAR);
    }

    #[test]
    fn test_rank_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Rank::MODERATOR).unwrap(), "50");
        let r: Rank = serde_json::from_str("-10").unwrap();
        assert_eq!(r, Rank::RESTRICTED);
    }

    #[test]
    fn test_command_min_ranks() {
        assert_eq!(Command::Promote.min_rank(), Rank::ADMIN);
        assert_eq!(Command::Ban.min_rank(), Rank::ADMIN);
        assert_eq!(Command::Settings.min_rank(), Rank::ADMIN);
        assert_eq!(Command::Warn.min_rank(), Rank::MODERATOR);
        assert_eq!(Command::Mute.min_rank(), Rank::MODERATOR);
        assert_eq!(Command::Rules.min_rank(), Rank::MODERATOR);
        assert_eq!(Command::Stats.min_rank(), Rank::REGULAR);
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/ban"), Some(Command::Ban));
        assert_eq!(Command::parse("UNMUTE"), Some(Command::Unmute));
        assert_eq!(Command::parse("calendar"), None);
    }

    #[test]
    fn test_available_commands_by_rank() {
        let regular = available_commands(Rank::REGULAR);
        assert_eq!(regular, vec![Command::Start, Command::Help, Command::Stats]);

        let moderator = available_commands(Rank::MODERATOR);
        assert!(moderator.contains(&Command::Warn));
        assert!(moderator.contains(&Command::Rules));
        assert!(!moderator.contains(&Command::Ban));

        assert_eq!(available_commands(Rank::ADMIN).len(), Command::ALL.len());
        assert!(available_commands(Rank::BANNED).is_empty());
    }
}
