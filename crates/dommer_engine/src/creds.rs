// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! Per-team credential copies. Every team starts from the global credlist
//! templates and owns an independent copy of each list, so a password
//! rotation by one team never changes what another team is checked with.

use dommer_checks::Credential;
use dommer_common::models::CredlistRecord;
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credlist candidates to draw from")]
    NoCandidates,
    #[error("unknown credlist for team {team}: {credlist}")]
    UnknownCredlist { team: u8, credlist: String },
    #[error("credlist {0} has no entries")]
    EmptyCredlist(String),
}

#[derive(Debug, Default)]
pub struct CredentialLedger {
    // (team identifier, credlist name) -> that team's copy
    copies: BTreeMap<(u8, String), BTreeMap<String, String>>,
}

impl CredentialLedger {
    /// Seeds one independent copy of every template per team.
    pub fn seed(teams: &[u8], credlists: &[CredlistRecord]) -> Self {
        let mut copies = BTreeMap::new();
        for &team in teams {
            for list in credlists {
                copies.insert((team, list.name.clone()), list.creds.clone());
            }
        }
        CredentialLedger { copies }
    }

    /// Seeds copies for one team without touching existing ones, used when
    /// the roster grows mid-competition.
    pub fn add_team(&mut self, team: u8, credlists: &[CredlistRecord]) {
        for list in credlists {
            self.copies
                .entry((team, list.name.clone()))
                .or_insert_with(|| list.creds.clone());
        }
    }

    /// Draws one credential for a check: a credlist name uniformly at random
    /// from the candidates, then an entry uniformly at random from the
    /// team's copy of it.
    pub fn draw(&self, team: u8, candidates: &[String]) -> Result<Credential, CredentialError> {
        let mut rng = rand::rng();
        let name = candidates
            .choose(&mut rng)
            .ok_or(CredentialError::NoCandidates)?;
        let copy = self
            .copies
            .get(&(team, name.clone()))
            .ok_or_else(|| CredentialError::UnknownCredlist {
                team,
                credlist: name.clone(),
            })?;
        let users: Vec<&String> = copy.keys().collect();
        let user = users
            .choose(&mut rng)
            .ok_or_else(|| CredentialError::EmptyCredlist(name.clone()))?;
        Ok(Credential {
            user: (*user).clone(),
            secret: copy[*user].clone(),
        })
    }

    /// Applies a password change request: secrets of users already present
    /// in the team's copy are overwritten, unknown users are dropped.
    pub fn rotate(
        &mut self,
        team: u8,
        credlist: &str,
        updates: &BTreeMap<String, String>,
    ) -> Result<usize, CredentialError> {
        let copy = self
            .copies
            .get_mut(&(team, credlist.to_string()))
            .ok_or_else(|| CredentialError::UnknownCredlist {
                team,
                credlist: credlist.to_string(),
            })?;
        let mut changed = 0;
        for (user, secret) in updates {
            if let Some(entry) = copy.get_mut(user) {
                *entry = secret.clone();
                changed += 1;
            }
        }
        Ok(changed)
    }

    #[cfg(test)]
    fn secret_for(&self, team: u8, credlist: &str, user: &str) -> Option<&String> {
        self.copies
            .get(&(team, credlist.to_string()))
            .and_then(|copy| copy.get(user))
    }
}
