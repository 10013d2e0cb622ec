use std::path::Path;

const COMMON_ENV: &str = "config/common.env";
const SECRETS_ENV: &str = ".secrets.env";

pub fn is_production() -> bool {
    dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string()) == "production"
}

/// Loads the env files for the current profile, later files overriding
/// earlier ones. Runs before tracing is up, so it reports which files were
/// loaded and skipped instead of logging them.
pub fn load_environment() -> Result<EnvReport, dotenvy::Error> {
    let profile_env = if is_production() {
        "config/prod.env"
    } else {
        "config/dev.env"
    };

    load_env_files(&[COMMON_ENV, profile_env, SECRETS_ENV])
}

#[derive(Debug, Default)]
pub struct EnvReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
}

impl EnvReport {
    pub fn log(&self) {
        for path in &self.loaded {
            tracing::info!("Loaded environment from: {}", path);
        }
        for path in &self.skipped {
            tracing::warn!("Environment file {} not found, skipping", path);
        }
    }
}

pub fn load_env_files(paths: &[&str]) -> Result<EnvReport, dotenvy::Error> {
    let mut report = EnvReport::default();

    for path in paths {
        if !Path::new(path).exists() {
            report.skipped.push(path.to_string());
            continue;
        }

        dotenvy::from_filename_override(path)?;
        report.loaded.push(path.to_string());
    }

    Ok(report)
}
