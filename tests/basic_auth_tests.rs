mod auth_support;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use auth_support::{
    basic_config, login, manager, wait_for_challenges, Answer, InMemoryCredentialStore,
    ScriptedCallback,
};
use authflow::auth::{AuthenticationProvider, AuthenticationRequest, LoginOutcome, Status};
use authflow::challenge::{
    ChallengeType, ERROR_CODE_KEY, PASSWORD_KEY, REMEMBER_CREDENTIALS_PREF_KEY, USERNAME_KEY,
};
use authflow::config::{AuthConfig, AuthScheme};
use authflow::error::{AuthError, ErrorCode};
use pretty_assertions::assert_eq;
use wiremock::matchers::{basic_auth, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login(server: &MockServer, password: &str, status: u16, expected: u64) {
    let mut response = ResponseTemplate::new(status);
    if status == 200 {
        response = response.insert_header("set-cookie", "SESSION=abc123; Path=/; HttpOnly");
    }
    Mock::given(method("GET"))
        .and(path("/login"))
        .and(basic_auth("alice", password))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn basic_login_prompts_once_and_establishes_cookie_session() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Proceed(login("alice", "s3cret"))]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);

    let outcome = manager
        .login(AuthenticationRequest::default())
        .await
        .expect("login succeeds");

    let LoginOutcome::Authenticated(context) = outcome else {
        panic!("expected an authenticated outcome");
    };
    assert_eq!(context.status, Status::Success);
    assert_eq!(context.provider, Some(AuthenticationProvider::Basic));
    assert_eq!(context.user_name.as_deref(), Some("alice"));
    assert!(context.cookies.iter().any(|c| c.name == "SESSION" && c.value == "abc123"));
    assert!(!context.input_params.contains_key(PASSWORD_KEY));

    let challenges = callback.challenges();
    assert_eq!(challenges.len(), 1);
    assert_eq!(challenges[0].kind, ChallengeType::UsernamePwdRequired);
    assert!(manager.is_authenticated(false).await);
}

#[tokio::test]
async fn refused_credentials_reprompt_with_error_code_and_username() {
    let server = MockServer::start().await;
    mount_login(&server, "wrong", 401, 1).await;
    mount_login(&server, "s3cret", 200, 1).await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([
        Answer::Proceed(login("alice", "wrong")),
        Answer::Proceed(login("alice", "s3cret")),
    ]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);

    let outcome = manager
        .login(AuthenticationRequest::default())
        .await
        .expect("second answer succeeds");
    assert!(outcome.is_authenticated());

    let challenges = callback.challenges();
    assert_eq!(challenges.len(), 2);
    let retry = &challenges[1].fields;
    assert_eq!(retry.get_str(ERROR_CODE_KEY), Some("authentication_failed"));
    assert_eq!(retry.get_str(USERNAME_KEY), Some("alice"));
    assert!(!retry.contains_key(PASSWORD_KEY));
}

#[tokio::test]
async fn incomplete_answer_is_reprompted_without_reaching_the_server() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([
        Answer::Proceed(login("alice", "")),
        Answer::Proceed(login("alice", "s3cret")),
    ]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);

    let outcome = manager.login(AuthenticationRequest::default()).await.unwrap();
    assert!(outcome.is_authenticated());

    let challenges = callback.challenges();
    assert_eq!(challenges.len(), 2);
    assert_eq!(
        challenges[1].fields.get_str(ERROR_CODE_KEY),
        Some("password_required")
    );
    assert_eq!(challenges[1].fields.get_str(USERNAME_KEY), Some("alice"));
}

#[tokio::test]
async fn repeated_failures_end_with_max_retries() {
    let server = MockServer::start().await;
    mount_login(&server, "wrong", 401, 2).await;

    let mut config = basic_config(&server.uri());
    config.max_login_attempts = 2;
    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([
        Answer::Proceed(login("alice", "wrong")),
        Answer::Proceed(login("alice", "wrong")),
    ]);
    let manager = manager(config, &store, &callback);

    let err = manager
        .login(AuthenticationRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MaxRetriesReached);
    assert!(manager.context().is_none());
}

#[tokio::test]
async fn missing_required_cookie_fails_the_attempt() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;

    let mut config = basic_config(&server.uri());
    config.required_cookies.insert("SSO_TOKEN".to_string());
    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Proceed(login("alice", "s3cret"))]);
    let manager = manager(config, &store, &callback);

    let err = manager
        .login(AuthenticationRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Failed { .. }));
    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    assert_eq!(callback.challenges().len(), 1);
    assert!(manager.context().is_none());
}

#[tokio::test]
async fn required_cookie_that_already_expired_does_not_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .and(basic_auth("alice", "s3cret"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "SESSION=abc123; Path=/")
                .append_header("set-cookie", "SSO_TOKEN=gone; Path=/; Max-Age=0"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = basic_config(&server.uri());
    config.required_cookies.insert("SSO_TOKEN".to_string());
    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Proceed(login("alice", "s3cret"))]);
    let manager = manager(config, &store, &callback);

    let err = manager
        .login(AuthenticationRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    assert!(!manager.is_authenticated(false).await);
}

#[tokio::test]
async fn cancelling_the_challenge_ends_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Cancel]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);

    let outcome = manager.login(AuthenticationRequest::default()).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Cancelled));
    assert!(manager.context().is_none());
}

#[tokio::test]
async fn challenge_can_be_answered_later_from_another_task() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Hold]);
    let manager = Arc::new(manager(basic_config(&server.uri()), &store, &callback));

    let pending = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.login(AuthenticationRequest::default()).await }
    });

    wait_for_challenges(&callback, 1).await;
    let handler = callback.take_held().expect("challenge held");
    assert!(handler.is_pending());
    handler.proceed(login("alice", "s3cret")).unwrap();
    assert!(!handler.is_pending());

    let outcome = pending.await.unwrap().unwrap();
    assert!(outcome.is_authenticated());
}

#[tokio::test]
async fn manager_cancel_resolves_the_pending_challenge() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Hold]);
    let manager = Arc::new(manager(basic_config(&server.uri()), &store, &callback));

    let pending = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.login(AuthenticationRequest::default()).await }
    });

    wait_for_challenges(&callback, 1).await;
    manager.cancel();

    let outcome = pending.await.unwrap().unwrap();
    assert!(matches!(outcome, LoginOutcome::Cancelled));

    // A late answer finds nothing to resolve.
    let handler = callback.take_held().expect("challenge held");
    assert!(matches!(
        handler.proceed(login("alice", "s3cret")),
        Err(AuthError::IllegalState(_))
    ));
}

#[tokio::test]
async fn dropped_login_leaves_no_challenge_behind() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([
        Answer::Hold,
        Answer::Proceed(login("alice", "s3cret")),
    ]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        manager.login(AuthenticationRequest::default()),
    )
    .await;
    assert!(abandoned.is_err());

    let stale = callback.take_held().expect("challenge held");
    assert!(!stale.is_pending());
    assert!(matches!(
        stale.proceed(login("alice", "s3cret")),
        Err(AuthError::IllegalState(_))
    ));

    let outcome = manager
        .login(AuthenticationRequest::default())
        .await
        .expect("next login is not blocked");
    assert!(outcome.is_authenticated());
    assert_eq!(callback.challenges().len(), 2);
}

#[tokio::test]
async fn valid_session_is_reused_until_login_is_forced() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 2).await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([
        Answer::Proceed(login("alice", "s3cret")),
        Answer::Proceed(login("alice", "s3cret")),
    ]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);
    manager.login(AuthenticationRequest::default()).await.unwrap();

    let outcome = manager.login(AuthenticationRequest::default()).await.unwrap();
    let LoginOutcome::Authenticated(context) = outcome else {
        panic!("expected the retained session");
    };
    assert_eq!(context.status, Status::Success);
    assert_eq!(context.user_name.as_deref(), Some("alice"));
    assert_eq!(callback.challenges().len(), 1);

    let forced = AuthenticationRequest::builder()
        .force_authentication(true)
        .build();
    assert!(manager.login(forced).await.unwrap().is_authenticated());
    assert_eq!(callback.challenges().len(), 2);
}

#[tokio::test]
async fn headers_replay_remembered_credentials_and_session_cookie() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;

    let mut config = basic_config(&server.uri());
    config.remember_credentials_enabled = true;
    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Proceed(
        login("alice", "s3cret").with(REMEMBER_CREDENTIALS_PREF_KEY, true),
    )]);
    let manager = manager(config, &store, &callback);
    manager.login(AuthenticationRequest::default()).await.unwrap();

    let headers = manager.headers(&BTreeSet::new()).unwrap();
    assert_eq!(
        headers.get("Authorization").map(String::as_str),
        Some("Basic YWxpY2U6czNjcmV0")
    );
    assert_eq!(headers.get("Cookie").map(String::as_str), Some("SESSION=abc123"));
}

#[tokio::test]
async fn headers_without_remembered_password_carry_only_cookies() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Proceed(login("alice", "s3cret"))]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);

    let err = manager.headers(&BTreeSet::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);

    manager.login(AuthenticationRequest::default()).await.unwrap();
    let headers = manager.headers(&BTreeSet::new()).unwrap();
    assert!(!headers.contains_key("Authorization"));
    assert_eq!(headers.get("Cookie").map(String::as_str), Some("SESSION=abc123"));
}

#[tokio::test]
async fn logout_calls_server_once_and_is_idempotent() {
    let server = MockServer::start().await;
    mount_login(&server, "s3cret", 200, 1).await;
    Mock::given(method("GET"))
        .and(path("/logout"))
        .and(header("cookie", "SESSION=abc123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::new([Answer::Proceed(login("alice", "s3cret"))]);
    let manager = manager(basic_config(&server.uri()), &store, &callback);
    manager.login(AuthenticationRequest::default()).await.unwrap();

    manager.logout(false).await.unwrap();
    assert!(!manager.is_authenticated(false).await);
    assert!(manager.context().is_none());

    manager.logout(false).await.unwrap();
}

#[tokio::test]
async fn missing_scheme_is_a_configuration_error() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::silent();
    let manager = manager(AuthConfig::default(), &store, &callback);

    let err = manager
        .login(AuthenticationRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Configuration(_)));
    assert!(callback.challenges().is_empty());
}

#[tokio::test]
async fn requesting_an_unconfigured_scheme_is_rejected() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryCredentialStore::new());
    let callback = ScriptedCallback::silent();
    let manager = manager(basic_config(&server.uri()), &store, &callback);

    let request = AuthenticationRequest::builder()
        .scheme(AuthScheme::OAuth20)
        .build();
    let err = manager.login(request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidAuthenticationScheme);
}
