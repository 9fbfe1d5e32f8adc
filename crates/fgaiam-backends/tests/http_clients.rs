//! Keycloak and control-plane client tests against mock servers.

use std::collections::BTreeMap;

use fgaiam_backends::{
    BackendError, ControlPlane, ControlPlaneClient, ControlPlaneClientConfig, IdentityProvider,
    KeycloakClient, KeycloakClientConfig,
};
use httpmock::prelude::*;
use serde_json::json;

// ============================================================
// Keycloak
// ============================================================

/// Test: the service-account token is requested once and reused
#[tokio::test]
async fn test_keycloak_token_is_cached_between_searches() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/realms/master/protocol/openid-connect/token")
                .body_includes("grant_type=client_credentials");
            then.status(200)
                .json_body(json!({"access_token": "tok", "expires_in": 300}));
        })
        .await;
    let search = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/admin/realms/acme/users")
                .header("authorization", "Bearer tok")
                .query_param("email", "ada@example.com")
                .query_param("exact", "true")
                .query_param("max", "1")
                .query_param("briefRepresentation", "true");
            then.status(200).json_body(json!([
                {"id": "u-1", "email": "ada@example.com", "firstName": "Ada", "lastName": "Lovelace"}
            ]));
        })
        .await;

    let client = KeycloakClient::new(KeycloakClientConfig::new(
        server.base_url(),
        "fgaiam",
        "secret",
    ))
    .unwrap();

    for _ in 0..2 {
        let users = client
            .find_users_by_email("acme", "ada@example.com")
            .await
            .unwrap();
        assert_eq!(users[0].id, "u-1");
        assert_eq!(users[0].first_name.as_deref(), Some("Ada"));
    }

    token.assert_calls_async(1).await;
    search.assert_calls_async(2).await;
}

#[tokio::test]
async fn test_keycloak_search_failure_maps_to_status_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/realms/master/protocol/openid-connect/token");
            then.status(200)
                .json_body(json!({"access_token": "tok", "expires_in": 300}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/admin/realms/acme/users");
            then.status(403).body("forbidden");
        })
        .await;

    let client = KeycloakClient::new(KeycloakClientConfig::new(
        server.base_url(),
        "fgaiam",
        "secret",
    ))
    .unwrap();
    let err = client
        .find_users_by_email("acme", "ada@example.com")
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Status { status: 403, .. }));
}

// ============================================================
// Control plane
// ============================================================

#[tokio::test]
async fn test_control_plane_reads_account_and_workspace() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(
                "/clusters/root:orgs/apis/core.platform-mesh.io/v1alpha1/accounts/acme",
            );
            then.status(200).json_body(json!({
                "apiVersion": "core.platform-mesh.io/v1alpha1",
                "kind": "Account",
                "metadata": {"name": "acme"},
                "spec": {"type": "org", "displayName": "Acme"}
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/clusters/root:orgs/apis/tenancy.kcp.io/v1alpha1/workspaces/acme");
            then.status(200).json_body(json!({
                "metadata": {"name": "acme", "annotations": {"kcp.io/cluster": "1mxz9"}},
                "spec": {"type": {"name": "org"}}
            }));
        })
        .await;

    let client = ControlPlaneClient::new(ControlPlaneClientConfig::new(server.base_url())).unwrap();

    let account = client.get_account("root:orgs", "acme").await.unwrap().unwrap();
    assert_eq!(account.account_type, "org");

    let workspace = client
        .get_workspace("root:orgs", "acme")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(workspace.cluster, None);
    assert_eq!(workspace.cluster_id(), Some("1mxz9"));
    assert_eq!(
        workspace.annotations,
        BTreeMap::from([("kcp.io/cluster".to_string(), "1mxz9".to_string())])
    );
}

/// Test: a missing object is not an error
#[tokio::test]
async fn test_control_plane_not_found_is_none() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(404).json_body(json!({"kind": "Status", "reason": "NotFound"}));
        })
        .await;

    let client = ControlPlaneClient::new(ControlPlaneClientConfig::new(server.base_url())).unwrap();
    assert_eq!(client.get_account("root:orgs", "ghost").await.unwrap(), None);
    assert_eq!(client.get_workspace("root:orgs", "ghost").await.unwrap(), None);
}
