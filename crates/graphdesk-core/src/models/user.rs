use serde::{Deserialize, Serialize};

/// Fields selected for the signed-in user's profile.
///
/// Anything else Graph sends back (`@odata.context`, `id`) is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(rename = "userPrincipalName", default)]
    pub user_principal_name: Option<String>,
}

impl UserProfile {
    /// Work/school accounts carry `mail`; personal accounts only the UPN
    pub fn email(&self) -> Option<&str> {
        self.mail.as_deref().or(self.user_principal_name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_keeps_only_selected_fields() {
        let raw = json!({
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users/$entity",
            "id": "48d31887-5fad-4d73-a9f5-3c356e68a038",
            "displayName": "Megan Bowen",
            "mail": null,
            "userPrincipalName": "MeganB@contoso.com",
            "jobTitle": "Auditor"
        });
        let profile: UserProfile = serde_json::from_value(raw).unwrap();
        assert_eq!(profile.email(), Some("MeganB@contoso.com"));

        let round = serde_json::to_value(&profile).unwrap();
        let mut keys: Vec<&String> = round.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["displayName", "mail", "userPrincipalName"]);
    }
}
