use std::time::Duration;

/// Administrative endpoint configuration
///
/// Points at the command gateway in front of the cluster router.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// URL scheme, `http` or `https`
    pub scheme: String,

    /// Gateway host
    pub host: String,

    /// Gateway port
    pub port: u16,

    /// Fixed wait before the first readiness ping
    pub initial_wait: Duration,

    /// TCP connect timeout for each command
    pub connect_timeout: Duration,

    /// Per-command timeout (none: the endpoint decides)
    pub request_timeout: Option<Duration>,
}

impl BootstrapConfig {
    /// Create a configuration for the given gateway host
    pub fn new(host: &str) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.to_string(),
            port: 8080,
            initial_wait: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use TLS
    pub fn https(mut self) -> Self {
        self.scheme = "https".to_string();
        self
    }

    /// Set the readiness wait
    pub fn initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set per-command timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Parse from an endpoint URL
    ///
    /// Format: "http://host[:port]" or "https://host[:port]"
    ///
    /// # Examples
    ///
    /// ```
    /// use shardctl::BootstrapConfig;
    ///
    /// let config = BootstrapConfig::from_url("http://mongos:8081").unwrap();
    /// assert_eq!(config.host, "mongos");
    /// assert_eq!(config.port, 8081);
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| "URL must start with 'http://' or 'https://'".to_string())?;
        let default_port = match scheme {
            "http" => 80,
            "https" => 443,
            other => return Err(format!("Unsupported URL scheme '{}'", other)),
        };

        let authority = rest.trim_end_matches('/');
        if authority.contains('/') {
            return Err("Endpoint URL must not contain a path".to_string());
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse().map_err(|_| "Invalid port".to_string())?,
            ),
            None => (authority, default_port),
        };
        if host.is_empty() {
            return Err("Endpoint host cannot be empty".to_string());
        }

        let mut config = Self::new(host).port(port);
        if scheme == "https" {
            config = config.https();
        }
        Ok(config)
    }

    /// Convert to endpoint URL
    pub fn to_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// URL administrative commands are posted to
    pub fn command_url(&self) -> String {
        format!("{}/admin/command", self.to_url())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        if self.scheme != "http" && self.scheme != "https" {
            return Err(format!("Unsupported URL scheme '{}'", self.scheme));
        }

        if self.port == 0 {
            return Err("Port must be > 0".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0".to_string());
        }

        if matches!(self.request_timeout, Some(timeout) if timeout.is_zero()) {
            return Err("request_timeout must be > 0 when set".to_string());
        }

        Ok(())
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::new("mongos")
    }
}
