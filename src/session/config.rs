/// Session behaviour switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Table the session maps records to
    pub table: String,

    /// Flush pending work before any storage read made by the session
    pub autoflush: bool,

    /// Expire every entry when the outermost transaction commits
    pub expire_on_commit: bool,

    /// Reopen the session savepoint after it ends
    pub restart_savepoint: bool,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            table: "thing".to_string(),
            autoflush: true,
            expire_on_commit: true,
            restart_savepoint: false,
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn autoflush(mut self, autoflush: bool) -> Self {
        self.autoflush = autoflush;
        self
    }

    pub fn expire_on_commit(mut self, expire: bool) -> Self {
        self.expire_on_commit = expire;
        self
    }

    pub fn restart_savepoint(mut self, restart: bool) -> Self {
        self.restart_savepoint = restart;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid = |c: char| c.is_ascii_alphanumeric() || c == '_';
        if self.table.is_empty() || !self.table.chars().all(valid) {
            return Err(format!("Invalid table name: '{}'", self.table));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
