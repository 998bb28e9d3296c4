use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::participant::{ConnectionId, Participant};

pub const FAST_POINTS: u32 = 10;
pub const MEDIUM_POINTS: u32 = 5;
pub const SLOW_POINTS: u32 = 2;
pub const PODIUM_SIZE: usize = 3;

/// Points for a correct guess, stepped on the share of guessing time left.
pub fn points_for(remaining: Duration, budget: Duration) -> u32 {
    if budget.is_zero() {
        return 0;
    }
    let ratio = remaining.as_secs_f64() / budget.as_secs_f64();
    if ratio > 0.67 {
        FAST_POINTS
    } else if ratio > 0.33 {
        MEDIUM_POINTS
    } else if ratio > 0.0 {
        SLOW_POINTS
    } else {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: usize,
    pub id: ConnectionId,
    pub name: String,
    pub score: u32,
    pub podium: bool,
}

/// Ranks players by score, then name. Observers are left out.
pub fn final_standings<'a>(participants: impl IntoIterator<Item = &'a Participant>) -> Vec<Standing> {
    let mut players: Vec<&Participant> = participants
        .into_iter()
        .filter(|p| p.is_player())
        .collect();
    players.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    players
        .into_iter()
        .enumerate()
        .map(|(i, p)| Standing {
            rank: i + 1,
            id: p.id.clone(),
            name: p.name.clone(),
            score: p.score,
            podium: i < PODIUM_SIZE,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(45);

    #[test]
    fn points_step_down_with_time() {
        assert_eq!(points_for(Duration::from_secs(41), BUDGET), 10);
        assert_eq!(points_for(Duration::from_secs(20), BUDGET), 5);
        assert_eq!(points_for(Duration::from_secs(5), BUDGET), 2);
        assert_eq!(points_for(Duration::ZERO, BUDGET), 0);
    }

    #[test]
    fn boundaries_fall_into_lower_band() {
        // 0.67 and 0.33 exactly belong to the slower band
        let budget = Duration::from_secs(100);
        assert_eq!(points_for(Duration::from_secs(67), budget), 5);
        assert_eq!(points_for(Duration::from_secs(33), budget), 2);
        assert_eq!(points_for(Duration::from_secs(68), budget), 10);
    }

    fn player(id: &str, name: &str, score: u32) -> Participant {
        let mut p = Participant::new(id.into(), name.into(), false);
        p.score = score;
        p
    }

    #[test]
    fn standings_order_by_score_then_name() {
        let roster = vec![player("1", "A", 10), player("2", "B", 15), player("3", "C", 10)];
        let standings = final_standings(&roster);
        let order: Vec<_> = standings
            .iter()
            .map(|s| (s.name.as_str(), s.score, s.rank))
            .collect();
        assert_eq!(order, vec![("B", 15, 1), ("A", 10, 2), ("C", 10, 3)]);
    }

    #[test]
    fn podium_is_top_three_without_observers() {
        let mut roster = vec![
            player("1", "A", 1),
            player("2", "B", 2),
            player("3", "C", 3),
            player("4", "D", 4),
        ];
        let mut admin = Participant::new("9".into(), "Admin".into(), true);
        admin.score = 99;
        roster.push(admin);

        let standings = final_standings(&roster);
        assert_eq!(standings.len(), 4);
        assert!(standings.iter().all(|s| s.name != "Admin"));
        let podium: Vec<_> = standings.iter().filter(|s| s.podium).map(|s| s.name.as_str()).collect();
        assert_eq!(podium, vec!["D", "C", "B"]);
    }
}
