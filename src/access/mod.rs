use crate::auth::TokenData;
use crate::services::SharingService;

/// Permissions that allow reading another user's data
const VIEWING_PERMISSIONS: [&str; 2] = ["root", "view"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    Server,
    Owner,
    Shared,
}

/// Why a caller was turned away. Never rendered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NoIdentity,
    NotShared,
    PermissionLookupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(GrantReason),
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }
}

/// Decide whether `token` may view the data owned by `target_user_id`.
pub async fn authorize(token: Option<&TokenData>, target_user_id: &str, sharing: &dyn SharingService) -> AccessDecision {
    let Some(token) = token else {
        return AccessDecision::Denied(DenialReason::NoIdentity);
    };

    if token.is_server {
        return AccessDecision::Granted(GrantReason::Server);
    }
    if token.user_id == target_user_id {
        return AccessDecision::Granted(GrantReason::Owner);
    }

    match sharing.user_in_group(&token.user_id, target_user_id).await {
        Ok(perms) => {
            let can_view = VIEWING_PERMISSIONS
                .iter()
                .any(|name| perms.get(*name).is_some_and(|grant| !grant.is_null()));
            if can_view {
                AccessDecision::Granted(GrantReason::Shared)
            } else {
                AccessDecision::Denied(DenialReason::NotShared)
            }
        }
        Err(e) => {
            tracing::error!("Error looking up user {} in group {}: {}", token.user_id, target_user_id, e);
            AccessDecision::Denied(DenialReason::PermissionLookupFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSharing;
    use serde_json::json;

    fn user(id: &str) -> TokenData {
        TokenData {
            user_id: id.to_string(),
            is_server: false,
        }
    }

    #[tokio::test]
    async fn missing_identity_is_denied() {
        let sharing = FakeSharing::default();
        assert_eq!(
            authorize(None, "bob", &sharing).await,
            AccessDecision::Denied(DenialReason::NoIdentity)
        );
    }

    #[tokio::test]
    async fn server_and_owner_skip_sharing_lookup() {
        let sharing = FakeSharing::failing();
        let server = TokenData {
            user_id: "svc".to_string(),
            is_server: true,
        };

        assert_eq!(
            authorize(Some(&server), "bob", &sharing).await,
            AccessDecision::Granted(GrantReason::Server)
        );
        assert_eq!(
            authorize(Some(&user("bob")), "bob", &sharing).await,
            AccessDecision::Granted(GrantReason::Owner)
        );
        assert_eq!(sharing.lookups(), 0);
    }

    #[tokio::test]
    async fn view_or_root_permission_grants_access() {
        let sharing = FakeSharing::default()
            .grant("alice", "bob", json!({ "view": {} }))
            .grant("carol", "bob", json!({ "root": {} }));

        assert!(authorize(Some(&user("alice")), "bob", &sharing).await.is_granted());
        assert!(authorize(Some(&user("carol")), "bob", &sharing).await.is_granted());
    }

    #[tokio::test]
    async fn other_permissions_do_not_grant_access() {
        let sharing = FakeSharing::default().grant("alice", "bob", json!({ "upload": {}, "view": null }));

        assert_eq!(
            authorize(Some(&user("alice")), "bob", &sharing).await,
            AccessDecision::Denied(DenialReason::NotShared)
        );
        assert_eq!(
            authorize(Some(&user("dave")), "bob", &sharing).await,
            AccessDecision::Denied(DenialReason::NotShared)
        );
    }

    #[tokio::test]
    async fn lookup_failure_is_a_denial() {
        let sharing = FakeSharing::failing();
        assert_eq!(
            authorize(Some(&user("alice")), "bob", &sharing).await,
            AccessDecision::Denied(DenialReason::PermissionLookupFailed)
        );
        assert_eq!(sharing.lookups(), 1);
    }
}
