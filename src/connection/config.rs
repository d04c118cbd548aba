const URL_SCHEME: &str = "savepointdb://";

/// Connection configuration
///
/// Format of the URL form: `savepointdb://<database>[?echo=true]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Database name, used in log lines only
    pub database: String,

    /// Log every statement and its parameters at `info` level
    pub echo: bool,
}

impl ConnectionConfig {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            echo: false,
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Enable or disable statement echo
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Parse from connection string
    ///
    /// # Examples
    ///
    /// ```
    /// use savepointdb::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::from_url("savepointdb://probe?echo=true").unwrap();
    /// assert_eq!(config.database, "probe");
    /// assert!(config.echo);
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let Some(rest) = url.strip_prefix(URL_SCHEME) else {
            return Err(format!("URL must start with '{}'", URL_SCHEME));
        };

        let (database, query) = match rest.split_once('?') {
            Some((database, query)) => (database, Some(query)),
            None => (rest, None),
        };

        let mut config = Self::new(database);
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("Invalid URL parameter: {}", pair))?;
            match key {
                "echo" => {
                    config.echo = value
                        .parse()
                        .map_err(|_| format!("Invalid value for echo: {}", value))?;
                }
                _ => return Err(format!("Unknown URL parameter: {}", key)),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        if self.echo {
            format!("{}{}?echo=true", URL_SCHEME, self.database)
        } else {
            format!("{}{}", URL_SCHEME, self.database)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }

        if !self
            .database
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("Invalid database name: {}", self.database));
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("savepointdb")
    }
}
