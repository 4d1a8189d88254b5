use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::player::Player;

/// Smallest roster a game can be dealt for.
pub const MIN_PLAYERS: usize = 6;
/// Largest roster a room will seat.
pub const MAX_PLAYERS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mafia,
    Detective,
    Doctor,
    Villager,
}

// -- Quota table --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleQuota {
    pub min_players: u8,
    pub max_players: u8,
    pub mafia: u8,
    pub detective: u8,
    pub doctor: u8,
}

impl RoleQuota {
    pub fn named_roles(&self) -> usize {
        self.mafia as usize + self.detective as usize + self.doctor as usize
    }

    /// Villagers fill every seat the named roles leave open.
    pub fn villagers(&self, player_count: usize) -> usize {
        player_count - self.named_roles()
    }
}

/// How many of each named role a roster of a given size gets.
pub const ROLE_TABLE: [RoleQuota; 3] = [
    RoleQuota { min_players: 6, max_players: 8, mafia: 2, detective: 1, doctor: 1 },
    RoleQuota { min_players: 9, max_players: 11, mafia: 3, detective: 1, doctor: 1 },
    RoleQuota { min_players: 12, max_players: 15, mafia: 4, detective: 1, doctor: 1 },
];

pub fn quota_for(player_count: usize) -> Result<RoleQuota, RoleError> {
    ROLE_TABLE
        .iter()
        .find(|q| {
            player_count >= q.min_players as usize && player_count <= q.max_players as usize
        })
        .copied()
        .ok_or(RoleError::InvalidPlayerCount(player_count))
}

// -- Assignment --

/// Deal a role card to every player. The returned roster keeps the input
/// order; only the cards are shuffled. Everyone comes back alive, so a
/// re-deal also restarts an in-progress round.
pub fn assign_roles(players: &[Player], rng: &mut impl Rng) -> Result<Vec<Player>, RoleError> {
    let quota = quota_for(players.len())?;

    let mut deck: Vec<Role> = Vec::with_capacity(players.len());
    deck.extend(std::iter::repeat(Role::Mafia).take(quota.mafia as usize));
    deck.extend(std::iter::repeat(Role::Detective).take(quota.detective as usize));
    deck.extend(std::iter::repeat(Role::Doctor).take(quota.doctor as usize));
    deck.resize(players.len(), Role::Villager);
    deck.shuffle(rng);

    Ok(players
        .iter()
        .zip(deck)
        .map(|(player, role)| {
            let mut player = player.clone();
            player.role = Some(role);
            player.is_alive = true;
            player
        })
        .collect())
}

/// Check an assigned roster against the distribution rules: at least one
/// mafia, no more mafia than a third of the roster (rounded up), and the
/// detective and doctor both dealt.
pub fn validate_distribution(players: &[Player]) -> Result<(), RoleError> {
    let mafia = count_role(players, Role::Mafia);
    let detectives = count_role(players, Role::Detective);
    let doctors = count_role(players, Role::Doctor);

    if mafia == 0 {
        return Err(RoleError::InvalidRoleDistribution("no mafia dealt".into()));
    }
    if mafia > players.len().div_ceil(3) {
        return Err(RoleError::InvalidRoleDistribution(format!(
            "{} mafia is more than a third of {} players",
            mafia,
            players.len()
        )));
    }
    if detectives == 0 {
        return Err(RoleError::InvalidRoleDistribution("no detective dealt".into()));
    }
    if doctors == 0 {
        return Err(RoleError::InvalidRoleDistribution("no doctor dealt".into()));
    }
    Ok(())
}

fn count_role(players: &[Player], role: Role) -> usize {
    players.iter().filter(|p| p.role == Some(role)).count()
}

// -- Errors --

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("invalid player count: {0} (need 6-15)")]
    InvalidPlayerCount(usize),
    #[error("invalid role distribution: {0}")]
    InvalidRoleDistribution(String),
}
