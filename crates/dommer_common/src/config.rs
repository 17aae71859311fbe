// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use crate::models::{BoxRecord, CredlistRecord, InjectRecord, Settings, TeamRecord};
use serde::{Deserialize, Serialize};

/// The competition configuration file, read once at startup and used to
/// seed the stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub competition: CompetitionConfig,
    #[serde(default)]
    pub boxes: Vec<BoxRecord>,
    #[serde(default)]
    pub credlists: Vec<CredlistRecord>,
    #[serde(default)]
    pub teams: Vec<TeamRecord>,
    #[serde(default)]
    pub injects: Vec<InjectRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompetitionConfig {
    /// The display name of the competition.
    pub name: String,
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_a_full_competition_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [competition]
            name = "example"

            [competition.settings]
            check_time = 30
            check_timeout = 5
            first_octets = "172.16"

            [[credlists]]
            name = "admins"
            [credlists.creds]
            root = "toor"

            [[boxes]]
            name = "web"
            identifier = 5
            [[boxes.services]]
            type = "http"
            port = 8080
            path = "/login"

            [[teams]]
            name = "team01"
            identifier = 20

            [[injects]]
            id = 1
            name = "incident report"
            worth = 100.0
            [injects.rubric.clarity]
            weight = 0.5
            tiers = ["none", "partial", "full"]
            "#,
        )
        .unwrap();

        assert_eq!(config.competition.name, "example");
        assert_eq!(config.boxes[0].services.len(), 1);
        assert_eq!(config.teams[0].identifier, 20);
        assert_eq!(config.injects[0].rubric["clarity"].tiers.len(), 3);
    }
}
