//! Database connection related constants.
use super::secrets::env_or_secret;
use std::{env::var, sync::LazyLock};

/// Full connection URL. `DATABASE_URL` wins when set, otherwise the URL is
/// assembled from the individual `DB_*` variables.
pub static DB_URL: LazyLock<String> = LazyLock::new(|| {
    var("DATABASE_URL").unwrap_or_else(|_| {
        let host = var("DB_HOST").expect("DB_HOST not provided in environment variables");
        let username =
            var("DB_USERNAME").expect("DB_USERNAME not provided in environment variables");
        let database =
            var("DB_DATABASE").expect("DB_DATABASE not provided in environment variables");
        let password = env_or_secret("DB_PASSWORD").expect(
            "Neither DB_PASSWORD nor DB_PASSWORD_DOCKER_SECRET provided in environment variables",
        );
        format!("postgres://{username}:{password}@{host}/{database}")
    })
});

/// Selects the storage backend. `memory` runs against an in-process store,
/// anything else (the default) uses Postgres.
pub static STORE_BACKEND: LazyLock<String> =
    LazyLock::new(|| var("LEARNHUB_STORE").unwrap_or_else(|_| String::from("postgres")));
