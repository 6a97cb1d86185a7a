#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::core::auth::{
        AuthError, JwtConfig, JwtError, MIN_BCRYPT_COST, PasswordHasher, RotationPolicy, SessionConfig,
        SessionManager, TokenAuthority,
    };
    use crate::core::db::{
        CredentialStore, InMemoryCredentialStore, InMemoryRefreshTokenStore, Lookup,
        RefreshTokenStore,
    };

    type Manager = SessionManager<InMemoryCredentialStore, InMemoryRefreshTokenStore>;

    fn manager(rotation: RotationPolicy) -> Manager {
        SessionManager::new(
            InMemoryCredentialStore::new(),
            InMemoryRefreshTokenStore::new(),
            TokenAuthority::new(JwtConfig::new("end_to_end_secret")),
            PasswordHasher::new(MIN_BCRYPT_COST),
            SessionConfig::default().rotation(rotation),
        )
    }

    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let manager = manager(RotationPolicy::Consume);

        manager.register("a@x.com", "secret1").await.unwrap();
        let user_id = match manager.credentials().find_by_email("a@x.com").await {
            Lookup::Found(user) => user.id,
            other => panic!("expected Found, got {:?}", other),
        };

        // login: A1 / R1
        let first = manager.login("a@x.com", "secret1").await.unwrap();

        // refresh: A2 / R2
        let second = manager.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.access_token, first.access_token);
        assert_ne!(second.refresh_token, first.refresh_token);

        assert_eq!(manager.verify(&second.access_token).await.unwrap(), user_id);

        // A1 stays usable until its own expiry
        assert_eq!(manager.verify(&first.access_token).await.unwrap(), user_id);

        let past_expiry = Utc::now() + Duration::minutes(16);
        let result = manager
            .authority()
            .verify_token_at(&first.access_token, past_expiry);
        assert!(matches!(result, Err(JwtError::Expired)));

        // R1 was consumed, R2 is live
        assert!(
            !manager
                .refresh_tokens()
                .is_valid(user_id, &first.refresh_token)
                .await
                .unwrap()
        );
        assert!(
            manager
                .refresh_tokens()
                .is_valid(user_id, &second.refresh_token)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_retain_lifecycle_keeps_earlier_refresh_tokens() {
        let manager = manager(RotationPolicy::Retain);

        manager.register("b@x.com", "secret1").await.unwrap();
        let first = manager.login("b@x.com", "secret1").await.unwrap();
        let second = manager.refresh(&first.refresh_token).await.unwrap();

        // both refresh tokens remain exchangeable
        assert!(manager.refresh(&first.refresh_token).await.is_ok());
        assert!(manager.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_all_ends_every_session() {
        let manager = manager(RotationPolicy::Consume);

        manager.register("c@x.com", "secret1").await.unwrap();
        let laptop = manager.login("c@x.com", "secret1").await.unwrap();
        let phone = manager.login("c@x.com", "secret1").await.unwrap();
        let user_id = manager.verify(&laptop.access_token).await.unwrap();

        assert_eq!(manager.logout_all(user_id).await.unwrap(), 2);

        for tokens in [&laptop, &phone] {
            assert!(matches!(
                manager.refresh(&tokens.refresh_token).await,
                Err(AuthError::InvalidToken)
            ));
        }
    }

    #[tokio::test]
    async fn test_tokens_do_not_cross_deployments() {
        let ours = manager(RotationPolicy::Consume);
        let theirs = SessionManager::new(
            InMemoryCredentialStore::new(),
            InMemoryRefreshTokenStore::new(),
            TokenAuthority::new(JwtConfig::new("another_deployment")),
            PasswordHasher::new(MIN_BCRYPT_COST),
            SessionConfig::default(),
        );

        theirs.register("d@x.com", "secret1").await.unwrap();
        let tokens = theirs.login("d@x.com", "secret1").await.unwrap();

        assert!(matches!(
            ours.verify(&tokens.access_token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            ours.refresh(&tokens.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }
}
