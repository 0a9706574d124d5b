//! Prompt construction for match predictions.
//!
//! One shared system/user pair is built per match and sent to every
//! provider, so that agents compete on reasoning rather than on prompt
//! differences.

use crate::types::Match;

/// A system/user prompt pair.
#[derive(Debug, Clone)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

impl PromptPair {
    /// The full rendered prompt, as stored in the audit log.
    pub fn rendered(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Build the prediction prompt for a match from its current state
/// (teams, venue, schedule, lineups and toss when announced).
pub fn build_prediction_prompt(m: &Match) -> PromptPair {
    let system = "You are an elite cricket analyst competing against other AI models \
                  to predict T20 World Cup 2026 match winners. Your accuracy, confidence \
                  calibration, and reasoning are being tracked on a public leaderboard."
        .to_string();

    let mut user = String::with_capacity(1024);

    user.push_str(&format!("MATCH: {} vs {}\n", m.team_a, m.team_b));
    user.push_str(&format!(
        "Match #{} | {} | {} | {}\n",
        m.match_number,
        m.stage,
        m.venue,
        m.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
    ));

    if let Some(xi) = &m.playing_xi_a {
        if !xi.is_empty() {
            user.push_str(&format!("\n{} Playing XI: {}\n", m.team_a, xi.join(", ")));
        }
    }
    if let Some(xi) = &m.playing_xi_b {
        if !xi.is_empty() {
            user.push_str(&format!("{} Playing XI: {}\n", m.team_b, xi.join(", ")));
        }
    }
    if let (Some(toss_winner), Some(toss_decision)) = (&m.toss_winner, &m.toss_decision) {
        user.push_str(&format!(
            "\nToss: {toss_winner} won and chose to {toss_decision}\n"
        ));
    }

    user.push_str("\nINSTRUCTIONS:\n");
    user.push_str(
        "1. Use web search to research the latest team news, player form, pitch conditions, \
         weather, and head-to-head stats\n",
    );
    user.push_str("2. Analyze all factors and predict the winner\n");
    user.push_str("3. Give your confidence level (0.50 = coin flip, 1.00 = certain)\n");
    user.push_str("4. Provide a concise 2-3 sentence explanation\n");
    user.push_str("\nIMPORTANT: Respond ONLY with valid JSON:\n");
    user.push_str(
        "{ \"winner\": \"Exact Team Name\", \"confidence\": 0.XX, \"reasoning\": \"Your 2-3 sentence analysis\" }\n",
    );

    PromptPair { system, user }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_match_details() {
        let m = Match::sample();
        let prompt = build_prediction_prompt(&m);
        assert!(prompt.system.contains("cricket analyst"));
        assert!(prompt.user.contains("India vs Pakistan"));
        assert!(prompt.user.contains("Colombo"));
        assert!(prompt.user.contains("Match #1"));
        assert!(prompt.user.contains("\"winner\""));
    }

    #[test]
    fn test_prompt_without_lineups_omits_xi() {
        let m = Match::sample();
        let prompt = build_prediction_prompt(&m);
        assert!(!prompt.user.contains("Playing XI"));
        assert!(!prompt.user.contains("Toss:"));
    }

    #[test]
    fn test_prompt_with_lineups_and_toss() {
        let mut m = Match::sample();
        m.playing_xi_a = Some(vec!["Rohit Sharma".into(), "Virat Kohli".into()]);
        m.playing_xi_b = Some(vec!["Babar Azam".into(), "Shaheen Afridi".into()]);
        m.toss_winner = Some("India".into());
        m.toss_decision = Some("bat".into());

        let prompt = build_prediction_prompt(&m);
        assert!(prompt.user.contains("India Playing XI: Rohit Sharma, Virat Kohli"));
        assert!(prompt.user.contains("Pakistan Playing XI: Babar Azam, Shaheen Afridi"));
        assert!(prompt.user.contains("Toss: India won and chose to bat"));
    }

    #[test]
    fn test_prompt_toss_requires_both_fields() {
        let mut m = Match::sample();
        m.toss_winner = Some("India".into());
        let prompt = build_prediction_prompt(&m);
        assert!(!prompt.user.contains("Toss:"));
    }

    #[test]
    fn test_rendered_combines_both_parts() {
        let m = Match::sample();
        let prompt = build_prediction_prompt(&m);
        let rendered = prompt.rendered();
        assert!(rendered.contains("cricket analyst"));
        assert!(rendered.contains("India vs Pakistan"));
    }
}
