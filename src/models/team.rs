use serde::{Deserialize, Serialize};

/// Team member as submitted to `/team/add`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

/// Team with its ordered member list; doubles as the `/team/add` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_name: String,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResponse {
    pub team: Team,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_serialization() {
        let team = Team {
            team_name: "team_1".to_string(),
            members: vec![Member {
                user_id: "u1".to_string(),
                username: "user_1".to_string(),
                is_active: true,
            }],
        };

        let json = serde_json::to_value(&team).unwrap();
        assert_eq!(json["team_name"], "team_1");
        assert_eq!(json["members"][0]["user_id"], "u1");
        assert_eq!(json["members"][0]["username"], "user_1");
        assert_eq!(json["members"][0]["is_active"], true);
    }
}
