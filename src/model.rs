use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    de,
};
use std::{
    fmt,
    str::FromStr,
};

/// Score at which a match is over.
pub const WINNING_SCORE: u32 = 3;

const MATCH_FOUND_PREFIX: &str = "Match found. Host: ";

/// Lower-cases and strips everything but ASCII letters and digits, so
/// `HOST_WINS`, `HostWins` and `host-wins` compare equal.
pub fn normalize_enum_key(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Stone,
    Paper,
    Scissors,
}

impl Choice {
    /// Case-insensitive parse accepting the `rock` and `scissor` aliases.
    pub fn normalize(value: &str) -> Option<Choice> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stone" | "rock" => Some(Choice::Stone),
            "paper" => Some(Choice::Paper),
            "scissor" | "scissors" => Some(Choice::Scissors),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Choice::Stone => "stone",
            Choice::Paper => "paper",
            Choice::Scissors => "scissors",
        }
    }

    /// Enum literal used when the application's declared names are unknown.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Choice::Stone => "Stone",
            Choice::Paper => "Paper",
            Choice::Scissors => "Scissors",
        }
    }

    /// Normalized enum keys that identify this choice on the server.
    pub fn enum_keys(self) -> &'static [&'static str] {
        match self {
            Choice::Stone => &["stone", "rock"],
            Choice::Paper => &["paper"],
            Choice::Scissors => &["scissors", "scissor"],
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Choice::normalize(s).ok_or_else(|| crate::Error::InvalidChoice(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for Choice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Choice::normalize(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown choice {raw:?}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MatchStatus {
    WaitingForPlayer,
    Active,
    Ended,
}

impl<'de> Deserialize<'de> for MatchStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match normalize_enum_key(&raw).as_str() {
            "waitingforplayer" | "waiting" => Ok(MatchStatus::WaitingForPlayer),
            "active" => Ok(MatchStatus::Active),
            "ended" => Ok(MatchStatus::Ended),
            _ => Err(de::Error::custom(format!("unknown match status {raw:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RoundOutcome {
    Draw,
    HostWins,
    GuestWins,
}

impl RoundOutcome {
    pub fn label_for(self, is_host: bool) -> RevealLabel {
        match (self, is_host) {
            (RoundOutcome::Draw, _) => RevealLabel::Tie,
            (RoundOutcome::HostWins, true) | (RoundOutcome::GuestWins, false) => {
                RevealLabel::Win
            }
            (RoundOutcome::HostWins, false) | (RoundOutcome::GuestWins, true) => {
                RevealLabel::Lose
            }
        }
    }
}

impl<'de> Deserialize<'de> for RoundOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match normalize_enum_key(&raw).as_str() {
            "draw" => Ok(RoundOutcome::Draw),
            "hostwins" => Ok(RoundOutcome::HostWins),
            "guestwins" => Ok(RoundOutcome::GuestWins),
            _ => Err(de::Error::custom(format!("unknown round outcome {raw:?}"))),
        }
    }
}

/// Text shown at the end of a reveal, from the local player's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealLabel {
    Win,
    Lose,
    Tie,
}

impl fmt::Display for RevealLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RevealLabel::Win => "win",
            RevealLabel::Lose => "lose",
            RevealLabel::Tie => "tie",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub round: u32,
    pub host_choice: Choice,
    pub guest_choice: Choice,
    pub outcome: RoundOutcome,
    pub host_score: u32,
    pub guest_score: u32,
    pub timestamp: String,
}

impl RoundRecord {
    /// The application stamps rounds with its system time in microseconds.
    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        let micros = self.timestamp.trim().parse::<i64>().ok()?;
        DateTime::from_timestamp_micros(micros)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub chain_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub match_id: String,
    pub host_chain_id: String,
    pub status: MatchStatus,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
    pub round: u32,
    pub host_score: u32,
    pub guest_score: u32,
    #[serde(default)]
    pub last_outcome: Option<RoundOutcome>,
    #[serde(default)]
    pub winner_chain_id: Option<String>,
    #[serde(default)]
    pub history: Vec<RoundRecord>,
}

/// Reads an explicit `null` as the type's default; the application answers
/// null for score fields while this chain has no game.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Everything the client mirrors from the application in one batched read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    #[serde(default)]
    pub game: Option<Game>,
    #[serde(default)]
    pub match_status: Option<MatchStatus>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_host: bool,
    #[serde(default)]
    pub opponent_chain_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub my_ready: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub opponent_ready: bool,
    #[serde(default)]
    pub my_choice: Option<Choice>,
    #[serde(default)]
    pub opponent_choice: Option<Choice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub my_score: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub opponent_score: u32,
    #[serde(default)]
    pub last_round_record: Option<RoundRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub round_history: Vec<RoundRecord>,
    #[serde(default)]
    pub last_notification: Option<String>,
}

impl MatchView {
    pub fn match_id(&self) -> Option<&str> {
        self.game.as_ref().map(|g| g.match_id.as_str())
    }

    pub fn is_terminal_by_score(&self) -> bool {
        self.my_score >= WINNING_SCORE || self.opponent_score >= WINNING_SCORE
    }

    /// Over either by score or because the application reports it ended.
    pub fn is_ended(&self) -> bool {
        let status = self
            .game
            .as_ref()
            .map(|g| g.status)
            .or(self.match_status);
        self.is_terminal_by_score() || status == Some(MatchStatus::Ended)
    }

    /// Display name of the first player whose chain is not `own_chain_id`.
    pub fn opponent_name(&self, own_chain_id: &str) -> String {
        self.game
            .as_ref()
            .and_then(|g| g.players.iter().find(|p| p.chain_id != own_chain_id))
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Opponent".to_string())
    }

    /// Host chain id announced by the matchmaker, if the last notification
    /// carries one.
    pub fn match_found_host(&self) -> Option<&str> {
        self.last_notification.as_deref().and_then(match_found_host)
    }

    pub fn final_result(&self) -> Option<FinalResult> {
        self.is_terminal_by_score().then(|| FinalResult {
            match_id: self.match_id().map(str::to_string),
            my_score: self.my_score,
            opponent_score: self.opponent_score,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub match_id: Option<String>,
    pub my_score: u32,
    pub opponent_score: u32,
}

impl FinalResult {
    pub fn is_terminal(&self) -> bool {
        self.my_score >= WINNING_SCORE || self.opponent_score >= WINNING_SCORE
    }

    pub fn did_win(&self) -> bool {
        self.my_score >= WINNING_SCORE
    }
}

/// Scores for the result screen: the recorded final result when it is
/// terminal, otherwise the live scores of `view`.
pub fn result_scores(final_result: Option<&FinalResult>, view: &MatchView) -> FinalResult {
    match final_result {
        Some(result) if result.is_terminal() => result.clone(),
        _ => FinalResult {
            match_id: view.match_id().map(str::to_string),
            my_score: view.my_score,
            opponent_score: view.opponent_score,
        },
    }
}

pub fn match_found_host(notification: &str) -> Option<&str> {
    let host = notification.strip_prefix(MATCH_FOUND_PREFIX)?.trim();
    (!host.is_empty()).then_some(host)
}

pub fn default_player_name(chain_id: &str) -> String {
    if chain_id.is_empty() {
        return "Player".to_string();
    }
    let prefix: String = chain_id.chars().take(6).collect();
    format!("Player-{prefix}")
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn normalize__accepts_aliases_and_case() {
        for raw in ["rock", "Rock", "STONE"] {
            assert_eq!(Choice::normalize(raw), Some(Choice::Stone), "{raw}");
        }
        assert_eq!(Choice::normalize("scissor"), Some(Choice::Scissors));
        assert_eq!(Choice::normalize("scissors"), Some(Choice::Scissors));
        assert_eq!(Choice::normalize("Paper"), Some(Choice::Paper));
    }

    proptest! {
        #[test]
        fn normalize__rejects_everything_else(raw in "[a-zA-Z]{0,10}") {
            let lower = raw.to_ascii_lowercase();
            let known = ["stone", "rock", "paper", "scissor", "scissors"];
            prop_assume!(!known.contains(&lower.as_str()));
            prop_assert_eq!(Choice::normalize(&raw), None);
        }
    }

    #[test]
    fn label_for__maps_outcome_from_local_perspective() {
        assert_eq!(RoundOutcome::Draw.label_for(true), RevealLabel::Tie);
        assert_eq!(RoundOutcome::HostWins.label_for(true), RevealLabel::Win);
        assert_eq!(RoundOutcome::HostWins.label_for(false), RevealLabel::Lose);
        assert_eq!(RoundOutcome::GuestWins.label_for(true), RevealLabel::Lose);
        assert_eq!(RoundOutcome::GuestWins.label_for(false), RevealLabel::Win);
    }

    #[test]
    fn deserialize__graphql_enum_literals() {
        // given
        let raw = json!({
            "round": 2,
            "hostChoice": "ROCK",
            "guestChoice": "SCISSORS",
            "outcome": "HOST_WINS",
            "hostScore": 2,
            "guestScore": 0,
            "timestamp": "1700000000000000"
        });

        // when
        let record: RoundRecord = serde_json::from_value(raw).unwrap();

        // then
        assert_eq!(record.host_choice, Choice::Stone);
        assert_eq!(record.guest_choice, Choice::Scissors);
        assert_eq!(record.outcome, RoundOutcome::HostWins);
        assert_eq!(record.played_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn deserialize__null_game_fields_read_as_defaults() {
        // given
        let raw = json!({
            "game": null,
            "matchStatus": null,
            "isHost": null,
            "myReady": null,
            "myScore": null,
            "opponentScore": null,
            "roundHistory": null,
            "lastNotification": "Waiting"
        });

        // when
        let view: MatchView = serde_json::from_value(raw).unwrap();

        // then
        assert_eq!(view.my_score, 0);
        assert_eq!(view.opponent_score, 0);
        assert!(!view.is_host);
        assert!(view.round_history.is_empty());
        assert_eq!(view.last_notification.as_deref(), Some("Waiting"));
    }

    #[test]
    fn deserialize__unknown_choice_is_rejected() {
        let raw = json!({
            "round": 1,
            "hostChoice": "LIZARD",
            "guestChoice": "PAPER",
            "outcome": "DRAW",
            "hostScore": 0,
            "guestScore": 0,
            "timestamp": "0"
        });

        assert!(serde_json::from_value::<RoundRecord>(raw).is_err());
    }

    #[test]
    fn is_ended__by_status_without_terminal_score() {
        // given
        let view: MatchView = serde_json::from_value(json!({
            "matchStatus": "ENDED",
            "myScore": 1,
            "opponentScore": 0
        }))
        .unwrap();

        // then
        assert!(view.is_ended());
        assert!(!view.is_terminal_by_score());
        assert_eq!(view.final_result(), None);
    }

    #[test]
    fn opponent_name__falls_back_when_alone() {
        let mut view = MatchView::default();
        assert_eq!(view.opponent_name("C1"), "Opponent");

        view.game = Some(Game {
            match_id: "m".into(),
            host_chain_id: "C1".into(),
            status: MatchStatus::Active,
            players: vec![
                PlayerInfo {
                    chain_id: "C1".into(),
                    name: "Ann".into(),
                },
                PlayerInfo {
                    chain_id: "C2".into(),
                    name: "Bo".into(),
                },
            ],
            round: 1,
            host_score: 0,
            guest_score: 0,
            last_outcome: None,
            winner_chain_id: None,
            history: vec![],
        });
        assert_eq!(view.opponent_name("C1"), "Bo");
    }

    #[test]
    fn match_found_host__extracts_trimmed_chain() {
        assert_eq!(match_found_host("Match found. Host: abc123 "), Some("abc123"));
        assert_eq!(match_found_host("Match found. Host: "), None);
        assert_eq!(match_found_host("Player joined"), None);
    }

    #[test]
    fn result_scores__prefer_terminal_final_result() {
        // given
        let recorded = FinalResult {
            match_id: Some("m1".into()),
            my_score: 3,
            opponent_score: 1,
        };
        let live = MatchView::default();

        // when
        let scores = result_scores(Some(&recorded), &live);

        // then
        assert_eq!(scores, recorded);
        assert!(scores.did_win());
        assert_eq!(result_scores(None, &live).my_score, 0);
    }

    #[test]
    fn default_player_name__uses_chain_prefix() {
        assert_eq!(default_player_name("45c6ea1ec597"), "Player-45c6ea");
        assert_eq!(default_player_name(""), "Player");
    }
}
