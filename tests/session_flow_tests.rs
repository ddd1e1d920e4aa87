//! Login, refresh rotation and replay detection over in-memory stores

mod common;

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use std::collections::HashSet;

    use authserver::auth::{opaque, AuthError};
    use authserver::models::ClientInfo;
    use authserver::store::RefreshTokenRepository;

    use crate::common::Harness;

    fn client() -> ClientInfo {
        ClientInfo::new("192.0.2.10", "integration-suite/1.0")
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_access_token() {
        let h = Harness::new();
        let subject = h.register("alice", "correct-horse").await;

        let tokens = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();

        let claims = h.service.authenticate(&tokens.token).unwrap();
        assert_eq!(claims.sub, subject);
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[tokio::test]
    async fn test_login_is_case_insensitive_on_username() {
        let h = Harness::new();
        h.register("Alice", "correct-horse").await;

        assert!(h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_access_token_expires_with_clock() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let tokens = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();

        h.clock.advance(Duration::seconds(899));
        assert!(h.service.authenticate(&tokens.token).is_ok());

        h.clock.advance(Duration::seconds(1));
        assert_eq!(
            h.service.authenticate(&tokens.token).unwrap_err(),
            AuthError::Expired
        );
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_detects_replay() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let first = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();

        let second = h
            .service
            .refresh(&first.refresh_token, &client())
            .await
            .unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        assert!(second.roles.is_none());
        assert!(h.service.authenticate(&second.token).is_ok());

        // Presenting the burned token again revokes the whole chain
        assert_eq!(
            h.service
                .refresh(&first.refresh_token, &client())
                .await
                .unwrap_err(),
            AuthError::ReplayDetected
        );
        assert!(h
            .service
            .refresh(&second.refresh_token, &client())
            .await
            .unwrap_err()
            .is_unauthorized());
    }

    #[tokio::test]
    async fn test_replay_only_burns_its_own_chain() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let laptop = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();
        let phone = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();

        h.service
            .refresh(&laptop.refresh_token, &client())
            .await
            .unwrap();
        assert!(h
            .service
            .refresh(&laptop.refresh_token, &client())
            .await
            .is_err());

        assert!(h
            .service
            .refresh(&phone.refresh_token, &client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_unauthorized() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let tokens = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();

        h.clock.advance(Duration::days(7));
        assert_eq!(
            h.service
                .refresh(&tokens.refresh_token, &client())
                .await
                .unwrap_err(),
            AuthError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_is_unauthorized() {
        let h = Harness::new();
        let well_formed_unknown = "f".repeat(64);
        for junk in ["", "not-a-token", well_formed_unknown.as_str()] {
            assert_eq!(
                h.service.refresh(junk, &client()).await.unwrap_err(),
                AuthError::Unauthorized
            );
        }
    }

    #[tokio::test]
    async fn test_logout_then_refresh_fails() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let tokens = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();

        assert!(h.service.logout(&tokens.refresh_token).await.unwrap());
        assert!(h
            .service
            .refresh(&tokens.refresh_token, &client())
            .await
            .unwrap_err()
            .is_unauthorized());
    }

    #[tokio::test]
    async fn test_refresh_records_client_metadata() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let tokens = h
            .service
            .login("alice", "correct-horse", &ClientInfo::new("198.51.100.4", "first/1"))
            .await
            .unwrap();
        let rotated = h
            .service
            .refresh(&tokens.refresh_token, &ClientInfo::new("198.51.100.5", "second/2"))
            .await
            .unwrap();

        assert_eq!(h.refresh_tokens.len(), 2);

        let successor = h
            .refresh_tokens
            .find_by_hash(&opaque::digest(&rotated.refresh_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(successor.client_addr.as_deref(), Some("198.51.100.5"));
        assert_eq!(successor.user_agent.as_deref(), Some("second/2"));
    }

    #[tokio::test]
    async fn test_purge_drops_stale_records() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let tokens = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();
        h.service
            .refresh(&tokens.refresh_token, &client())
            .await
            .unwrap();
        h.service.request_password_reset("alice").await.unwrap();

        assert_eq!(h.service.purge_expired().await.unwrap().refresh_tokens, 0);

        h.clock.advance(Duration::days(8));
        let report = h.service.purge_expired().await.unwrap();
        assert_eq!(report.refresh_tokens, 2);
        assert_eq!(report.password_resets, 1);
        assert!(h.refresh_tokens.is_empty());
        assert!(h.password_resets.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_has_single_winner() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;
        let tokens = h
            .service
            .login("alice", "correct-horse", &client())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = h.service.clone();
            let raw = tokens.refresh_token.clone();
            handles.push(tokio::spawn(async move {
                service.refresh(&raw, &client()).await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(tokens) => winners.push(tokens.refresh_token),
                Err(e) => assert!(e.is_unauthorized(), "unexpected error {:?}", e),
            }
        }

        assert_eq!(winners.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_logins_get_distinct_tokens() {
        let h = Harness::new();
        h.register("alice", "correct-horse").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = h.service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .login("alice", "correct-horse", &client())
                    .await
                    .unwrap()
                    .refresh_token
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
    }
}
