use std::fmt;

const FALLBACK_USER: &str = "local";
const USER_ENV_VARS: [&str; 3] = ["SLIDEFLOW_USER", "USER", "USERNAME"];

/// The acting user. Only used to scope stored presentations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Picks the first non-blank candidate: explicit flag, configured owner,
    /// then the environment.
    pub fn resolve(flag: Option<&str>, configured: Option<&str>) -> Self {
        Self::resolve_with(flag, configured, |var| std::env::var(var).ok())
    }

    fn resolve_with(
        flag: Option<&str>,
        configured: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        // a blank variable must not hide the ones after it
        let from_env = USER_ENV_VARS
            .iter()
            .find_map(|var| env(var).filter(|value| !value.trim().is_empty()));

        [flag.map(str::to_owned), configured.map(str::to_owned), from_env]
            .into_iter()
            .flatten()
            .map(|candidate| candidate.trim().to_owned())
            .find(|candidate| !candidate.is_empty())
            .map(Self::new)
            .unwrap_or_else(|| Self::new(FALLBACK_USER))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}
