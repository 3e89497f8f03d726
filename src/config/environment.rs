use std::fmt;
use std::str::FromStr;

/// Deployment environment, read from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Accepted `APP_ENV` spellings and what they mean.
const NAMES: &[(&str, Environment)] = &[
    ("development", Environment::Development),
    ("dev", Environment::Development),
    ("staging", Environment::Staging),
    ("production", Environment::Production),
    ("prod", Environment::Production),
];

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Production refuses to start without its primary datastore.
    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, env)| *env)
            .ok_or_else(|| {
                let accepted: Vec<&str> = NAMES.iter().map(|(name, _)| *name).collect();
                format!("APP_ENV '{}' is not one of {}", s, accepted.join(", "))
            })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!(" PRODUCTION ".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        let err = "qa".parse::<Environment>().unwrap_err();
        assert!(err.contains("staging"), "{}", err);
    }

    #[test]
    fn display_uses_canonical_name() {
        assert_eq!("prod".parse::<Environment>().unwrap().to_string(), "production");
        assert_eq!(Environment::default().to_string(), "development");
        assert!(!Environment::Staging.is_production());
    }
}
