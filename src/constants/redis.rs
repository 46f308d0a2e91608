//! Redis connection related constants.
use std::{env::var, sync::LazyLock};

/// The URL where the shared session store can be found.
pub static REDIS_URL: LazyLock<String> = LazyLock::new(|| {
    var("REDIS_URL").unwrap_or_else(|_| {
        let host = var("REDIS_HOST").expect("Neither REDIS_URL nor REDIS_HOST provided in environment variables");
        format!("redis://{host}/")
    })
});
