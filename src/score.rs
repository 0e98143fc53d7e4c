use crate::names::NameMap;
use crate::rank::{DenseRanking, RankMapping, WildcardCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Driver(usize),
    Team(usize),
}

/// Slot index alone decides driver vs team, whatever the cell contains.
pub fn slot_kind(slot: usize, prediction_drivers: usize) -> SlotKind {
    if slot < prediction_drivers {
        SlotKind::Driver(slot)
    } else {
        SlotKind::Team(slot - prediction_drivers)
    }
}

/// Deviation between the predicted position (the slot) and the actual rank.
/// A pick missing from `ranks` scores against its own slot, i.e. 0.
pub fn score(slot: usize, predicted: &str, ranks: &RankMapping, prediction_drivers: usize) -> usize {
    let predicted_index = match slot_kind(slot, prediction_drivers) {
        SlotKind::Driver(idx) | SlotKind::Team(idx) => idx,
    };
    let actual = ranks
        .get(predicted.trim())
        .copied()
        .unwrap_or(predicted_index);
    predicted_index.abs_diff(actual)
}

/// Every player's picks, slot by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scoreboard {
    pub players: Vec<String>,
    /// `picks[player][slot]`
    pub picks: Vec<Vec<String>>,
}

/// `scores[player][slot]`, driver slots against `drivers`, team slots against `teams`.
pub fn score_scoreboard(
    board: &Scoreboard,
    drivers: &RankMapping,
    teams: &RankMapping,
    prediction_drivers: usize,
) -> Vec<Vec<usize>> {
    board
        .picks
        .iter()
        .map(|picks| {
            picks
                .iter()
                .enumerate()
                .map(|(slot, pick)| {
                    let ranks = match slot_kind(slot, prediction_drivers) {
                        SlotKind::Driver(_) => drivers,
                        SlotKind::Team(_) => teams,
                    };
                    score(slot, pick, ranks, prediction_drivers)
                })
                .collect()
        })
        .collect()
}

/// A wildcard pick names the driver expected to lead the category, so its
/// score is that driver's dense rank. Picks that are not known drivers are a
/// data problem: warn and leave the score empty.
pub fn score_wildcard_picks(
    category: WildcardCategory,
    picks: &[String],
    ranking: &DenseRanking,
    names: &NameMap,
) -> Vec<Option<usize>> {
    picks
        .iter()
        .map(|pick| {
            let pick = pick.trim();
            if pick.is_empty() {
                return None;
            }
            match ranking.rank_of(pick) {
                Some(rank) => Some(rank),
                None if names.is_known_driver(pick) => {
                    tracing::warn!("{category}: no rank for {pick:?} in this cycle's table");
                    None
                }
                None => {
                    tracing::warn!(
                        "{category}: prediction {pick:?} does not match any known driver"
                    );
                    None
                }
            }
        })
        .collect()
}

pub fn player_total(slot_scores: &[usize], wildcard_scores: &[Option<usize>]) -> usize {
    slot_scores.iter().sum::<usize>() + wildcard_scores.iter().flatten().sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::dense_rank;

    fn ranks(pairs: &[(&str, usize)]) -> RankMapping {
        pairs.iter().map(|(n, r)| (n.to_string(), *r)).collect()
    }

    #[test]
    fn driver_slot_scores_absolute_deviation() {
        let r = ranks(&[("Verstappen", 0), ("Norris", 1)]);
        assert_eq!(score(0, "Verstappen", &r, 20), 0);
        assert_eq!(score(1, "Hamilton", &r, 20), 0);
        assert_eq!(score(2, "Norris", &r, 20), 1);
    }

    #[test]
    fn unmapped_pick_always_scores_zero() {
        let r = ranks(&[("Norris", 7)]);
        for slot in 0..30 {
            assert_eq!(score(slot, "Nobody", &r, 20), 0);
        }
    }

    #[test]
    fn team_slots_are_offset_by_prediction_drivers() {
        let teams = ranks(&[("Mclaren", 0), ("Ferrari", 3)]);
        assert_eq!(slot_kind(20, 20), SlotKind::Team(0));
        assert_eq!(score(20, "Mclaren", &teams, 20), 0);
        assert_eq!(score(21, "Ferrari", &teams, 20), 2);
        assert_eq!(score(29, "Ferrari", &teams, 20), 6);
    }

    #[test]
    fn scoreboard_uses_mapping_by_slot_kind() {
        let drivers = ranks(&[("Norris", 0), ("Piastri", 1)]);
        // Same short name on both sides so the slot kind is the only difference.
        let teams = ranks(&[("Norris", 1)]);
        let board = Scoreboard {
            players: vec!["Tim".to_string()],
            picks: vec![vec!["Piastri".to_string(), "Norris".to_string(), "Norris".to_string()]],
        };
        let scores = score_scoreboard(&board, &drivers, &teams, 2);
        assert_eq!(scores, vec![vec![1, 1, 1]]);
    }

    #[test]
    fn wildcard_picks_score_their_dense_rank() {
        let names = NameMap::season_2025();
        let ranking = dense_rank(&[
            ("Norris".to_string(), 4),
            ("Piastri".to_string(), 2),
            ("Verstappen".to_string(), 2),
            ("Hamilton".to_string(), 0),
        ]);
        let picks = vec![
            "Norris".to_string(),
            "Verstappen".to_string(),
            "Hamilton".to_string(),
            "Senna".to_string(),
            String::new(),
        ];
        let scores = score_wildcard_picks(WildcardCategory::Poles, &picks, &ranking, &names);
        assert_eq!(scores, vec![Some(0), Some(1), Some(2), None, None]);
        assert_eq!(player_total(&[1, 2], &scores), 6);
    }
}
