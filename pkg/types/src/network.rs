use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub namespace: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Network {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            created_at: Utc::now(),
        }
    }
}
