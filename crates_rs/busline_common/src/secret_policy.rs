const MIN_SECRET_LEN: usize = 16;

pub fn is_production_like(env_name: &str) -> bool {
    matches!(
        env_name.trim().to_ascii_lowercase().as_str(),
        "prod" | "production" | "staging"
    )
}

/// Rejects missing, short or placeholder secrets in prod/staging. Other
/// environments accept anything so local setups can run with `.env` defaults.
pub fn check_secret(
    env_name: &str,
    key: &str,
    value: Option<&str>,
    required_in_prod: bool,
) -> Result<(), String> {
    if !is_production_like(env_name) {
        return Ok(());
    }

    let secret = value.map(str::trim).unwrap_or("");
    if secret.is_empty() {
        return if required_in_prod {
            Err(format!("{key} must be set in prod/staging"))
        } else {
            Ok(())
        };
    }
    if secret.len() < MIN_SECRET_LEN {
        return Err(format!(
            "{key} must be at least {MIN_SECRET_LEN} characters in prod/staging"
        ));
    }
    if is_placeholder(secret) {
        return Err(format!(
            "{key} looks like a placeholder; use a generated secret"
        ));
    }
    Ok(())
}

fn is_placeholder(secret: &str) -> bool {
    let s = secret.to_ascii_lowercase();
    const FRAGMENTS: &[&str] = &[
        "change-me",
        "change_me",
        "changeme",
        "replace-me",
        "replace_me",
        "your-secret",
        "your_secret",
        "example",
        "sandbox-secret",
        "dev-secret",
        "dev_secret",
    ];
    if FRAGMENTS.iter().any(|f| s.contains(f)) {
        return true;
    }
    // "aaaaaaaaaaaaaaaa" and friends
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => true,
    }
}
