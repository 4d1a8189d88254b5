use serde::{Deserialize, Serialize};

use crate::player::Player;
use crate::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Mafia,
    Villagers,
}

/// Result of a win-condition check. `winner` is set exactly when
/// `game_over` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub game_over: bool,
    pub winner: Option<Winner>,
}

impl Verdict {
    pub const OPEN: Verdict = Verdict {
        game_over: false,
        winner: None,
    };

    pub fn won_by(winner: Winner) -> Self {
        Self {
            game_over: true,
            winner: Some(winner),
        }
    }
}

/// Count the living on each side and decide whether the game is over.
///
/// Mafia win when the villager side is wiped out or when living mafia
/// match or outnumber the living villager side; villagers win when the
/// mafia are gone. Ties go to the mafia. Never mutates anything, the
/// caller decides what to do with the verdict.
pub fn evaluate(players: &[Player]) -> Verdict {
    let living_mafia = players
        .iter()
        .filter(|p| p.is_alive && p.role == Some(Role::Mafia))
        .count();
    let living_villagers = players
        .iter()
        .filter(|p| p.is_alive && p.role != Some(Role::Mafia))
        .count();

    if living_villagers == 0 || (living_mafia > 0 && living_mafia >= living_villagers) {
        Verdict::won_by(Winner::Mafia)
    } else if living_mafia == 0 {
        Verdict::won_by(Winner::Villagers)
    } else {
        Verdict::OPEN
    }
}
