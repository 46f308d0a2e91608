use std::{env::var, fs::File, io::Read as _, path::Path};

const DOCKER_SECRETS_PATH: &str = "/run/secrets/";

/// Read a Docker secret by name from the secrets mount.
pub fn read_secret(name: &str) -> Result<String, std::io::Error> {
    let mut secret_val = String::new();
    File::open(Path::new(DOCKER_SECRETS_PATH).join(name.to_lowercase()))?
        .read_to_string(&mut secret_val)?;
    Ok(secret_val.trim_end().to_owned())
}

/// Read `name` from the environment, falling back to the Docker secret named
/// by `{name}_DOCKER_SECRET`. Returns `None` when neither is configured.
pub fn env_or_secret(name: &str) -> Option<String> {
    var(name).ok().or_else(|| {
        let secret_path = var(format!("{name}_DOCKER_SECRET")).ok()?;
        Some(
            read_secret(&secret_path)
                .unwrap_or_else(|err| panic!("Failed to read {name} docker secret: {err}")),
        )
    })
}
