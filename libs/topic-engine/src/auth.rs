use serde::Deserialize;

use reader_api::Authorizer;

/// Разрешение ролям читать topic. `"*"` совпадает с любым значением.
#[derive(Debug, Clone, Deserialize)]
pub struct Grant {
    pub topic: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Grant {
    fn allows(&self, topic: &str, role: &str) -> bool {
        (self.topic == "*" || self.topic == topic)
            && self.roles.iter().any(|r| r == "*" || r == role)
    }
}

/// Authorizer на основе статического списка grant'ов из конфига.
/// Выключенный authorizer пропускает всех.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    enabled: bool,
    grants: Vec<Grant>,
}

impl StaticAuthorizer {
    pub fn new(enabled: bool, grants: Vec<Grant>) -> Self {
        Self { enabled, grants }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }
}

impl Authorizer for StaticAuthorizer {
    fn can_consume(&self, topic: &str, role: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let allowed = self.grants.iter().any(|g| g.allows(topic, role));
        if !allowed {
            tracing::debug!(%topic, %role, "consume denied");
        }
        allowed
    }
}
