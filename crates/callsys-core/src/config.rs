//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `callsys-config.yaml` at the
//! project root. Every section is optional; missing fields take the
//! defaults below. Infrastructure URLs and secrets can be overridden from
//! the environment so they never need to live in the file.

use std::path::Path;

use callsys_types::Role;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration, mirroring `callsys-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallsysConfig {
    /// Connection strings and the HTTP listener.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Queue behavior.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Wait-time estimator.
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Operator sessions and bot authentication.
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Public ticket intake.
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Opening hours for ticket issuance.
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,

    /// Daily rollover.
    #[serde(default)]
    pub daily_reset: DailyResetConfig,

    /// Local clock used for dates and hours.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Chat-bot notifications.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Operator accounts.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl CallsysConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// Environment variables override YAML values:
    /// - `DRAGONFLY_URL`, `DATABASE_URL`, `NATS_URL`, `CALLSYS_PORT`
    /// - `LINE_ACCESS_TOKEN` sets `notifications.line_access_token`
    /// - `CALLSYS_BOT_TOKEN` sets `sessions.bot_token`
    /// - `CALLSYS_ADMIN_PASSWORD` sets the password of the `admin` user,
    ///   creating it when absent
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the string is not valid YAML or a value is
    /// out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.infrastructure.apply_env_overrides();
        if let Ok(val) = std::env::var("LINE_ACCESS_TOKEN") {
            self.notifications.line_access_token = Some(val);
        }
        if let Ok(val) = std::env::var("CALLSYS_BOT_TOKEN") {
            self.sessions.bot_token = Some(val);
        }
        if let Ok(val) = std::env::var("CALLSYS_ADMIN_PASSWORD") {
            self.set_admin_password(&val);
        }
    }

    /// Set the password of the `admin` account, creating it if needed.
    pub fn set_admin_password(&mut self, password: &str) {
        if let Some(user) = self.users.iter_mut().find(|u| u.username == "admin") {
            password.clone_into(&mut user.password);
        } else {
            self.users.push(UserConfig {
                username: "admin".to_owned(),
                password: password.to_owned(),
                role: Role::Admin,
                nickname: default_admin_nickname(),
            });
        }
    }

    /// Reject values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.passed_cap == 0 {
            return Err(invalid("queue.passed_cap", "must be at least 1"));
        }
        if self.estimator.window < 2 {
            return Err(invalid("estimator.window", "must be at least 2"));
        }
        if self.business_hours.open_hour > 23 || self.business_hours.close_hour > 24 {
            return Err(invalid("business_hours", "hours must lie in 0..=24"));
        }
        if self.business_hours.enabled
            && self.business_hours.open_hour == self.business_hours.close_hour
        {
            return Err(invalid(
                "business_hours",
                "open_hour and close_hour must differ",
            ));
        }
        if self.daily_reset.hour > 23 || self.daily_reset.minute > 59 {
            return Err(invalid("daily_reset", "time must be a valid HH:MM"));
        }
        if self.clock.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid("clock.utc_offset_minutes", "must be under 24h"));
        }
        if self.users.iter().any(|u| u.username.is_empty() || u.password.is_empty()) {
            return Err(invalid("users", "username and password must be non-empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

/// Connection strings and listener settings.
///
/// A missing `dragonfly_url` or `postgres_url` selects the in-process
/// backend for that store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// `Dragonfly` URL (`redis://host:port`).
    #[serde(default)]
    pub dragonfly_url: Option<String>,

    /// `PostgreSQL` URL.
    #[serde(default)]
    pub postgres_url: Option<String>,

    /// NATS URL for cross-instance event fan-out.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Address the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            dragonfly_url: None,
            postgres_url: None,
            nats_url: None,
            host: default_host(),
            port: default_port(),
        }
    }
}

impl InfrastructureConfig {
    /// Apply environment variable overrides for URLs and the port.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = Some(val);
        }
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.postgres_url = Some(val);
        }
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = Some(val);
        }
        if let Some(port) = std::env::var("CALLSYS_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            self.port = port;
        }
    }
}

/// Queue behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// Maximum passed numbers kept per line; the lowest are evicted.
    #[serde(default = "default_passed_cap")]
    pub passed_cap: usize,

    /// How many numbers ahead a subscriber gets the "get ready" message.
    #[serde(default = "default_proximity_lookahead")]
    pub proximity_lookahead: u64,

    /// Lifetime of a subscription in seconds.
    #[serde(default = "default_day_secs")]
    pub subscription_ttl_secs: u64,

    /// Entries kept in the operator log.
    #[serde(default = "default_admin_log_cap")]
    pub admin_log_cap: usize,

    /// Line created on first boot when none exist.
    #[serde(default)]
    pub default_line: DefaultLineConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            passed_cap: default_passed_cap(),
            proximity_lookahead: default_proximity_lookahead(),
            subscription_ttl_secs: default_day_secs(),
            admin_log_cap: default_admin_log_cap(),
            default_line: DefaultLineConfig::default(),
        }
    }
}

/// The line created on first boot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DefaultLineConfig {
    /// Display name.
    #[serde(default = "default_line_name")]
    pub name: String,
    /// Subscriber-facing code.
    #[serde(default = "default_line_prefix")]
    pub prefix: String,
    /// Display color.
    #[serde(default = "default_line_color")]
    pub color: String,
}

impl Default for DefaultLineConfig {
    fn default() -> Self {
        Self {
            name: default_line_name(),
            prefix: default_line_prefix(),
            color: default_line_color(),
        }
    }
}

/// Wait-time estimator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EstimatorConfig {
    /// Number of most recent call records averaged.
    #[serde(default = "default_estimator_window")]
    pub window: usize,
    /// Seconds a computed estimate is reused.
    #[serde(default = "default_estimator_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window: default_estimator_window(),
            cache_ttl_secs: default_estimator_ttl_secs(),
        }
    }
}

/// Operator sessions and bot authentication.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds, refreshed on every use.
    #[serde(default = "default_day_secs")]
    pub ttl_secs: u64,
    /// Shared secret chat-bot adapters present. Bot routes are disabled
    /// while unset.
    #[serde(default)]
    pub bot_token: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_day_secs(),
            bot_token: None,
        }
    }
}

/// Public ticket intake limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntakeConfig {
    /// Tickets one caller may take per window.
    #[serde(default = "default_intake_max")]
    pub max_per_window: u64,
    /// Window length in seconds.
    #[serde(default = "default_intake_window_secs")]
    pub window_secs: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_intake_max(),
            window_secs: default_intake_window_secs(),
        }
    }
}

/// Opening hours for ticket issuance (local time, `open_hour..close_hour`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusinessHoursConfig {
    /// Whether issuance is restricted at all.
    #[serde(default)]
    pub enabled: bool,
    /// First local hour tickets may be issued.
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,
    /// Local hour issuance stops.
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
        }
    }
}

/// Daily rollover.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DailyResetConfig {
    /// Whether lines reset automatically once a day.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local hour of the reset.
    #[serde(default = "default_reset_hour")]
    pub hour: u32,
    /// Local minute of the reset.
    #[serde(default)]
    pub minute: u32,
}

impl Default for DailyResetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: default_reset_hour(),
            minute: 0,
        }
    }
}

/// Local clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    /// Offset of local time from UTC in minutes (e.g. `480` for UTC+8).
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Chat-bot notifications.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationConfig {
    /// LINE channel access token; messages are only logged when unset.
    #[serde(default)]
    pub line_access_token: Option<String>,
    /// LINE push endpoint.
    #[serde(default = "default_line_push_url")]
    pub line_push_url: String,
    /// Message templates (`minijinja` syntax).
    #[serde(default)]
    pub templates: TemplateConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            line_access_token: None,
            line_push_url: default_line_push_url(),
            templates: TemplateConfig::default(),
        }
    }
}

/// Overrides for the built-in message templates. Unset entries keep the
/// built-in text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TemplateConfig {
    /// Sent when `current` reaches `number - lookahead`.
    #[serde(default)]
    pub approach: Option<String>,
    /// Sent when `current` reaches `number`.
    #[serde(default)]
    pub arrival: Option<String>,
    /// Reply to a successful subscription.
    #[serde(default)]
    pub subscribed: Option<String>,
    /// Reply to a cancellation.
    #[serde(default)]
    pub cancelled: Option<String>,
}

/// A seeded operator account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserConfig {
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Granted role.
    #[serde(default = "default_user_role")]
    pub role: Role,
    /// Name recorded in history; defaults to the username.
    #[serde(default)]
    pub nickname: String,
}

impl UserConfig {
    /// Nickname, falling back to the username.
    pub fn display_name(&self) -> &str {
        if self.nickname.is_empty() {
            &self.username
        } else {
            &self.nickname
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    3000
}

const fn default_passed_cap() -> usize {
    20
}

const fn default_proximity_lookahead() -> u64 {
    5
}

const fn default_day_secs() -> u64 {
    86_400
}

const fn default_admin_log_cap() -> usize {
    50
}

fn default_line_name() -> String {
    "General".to_owned()
}

fn default_line_prefix() -> String {
    "A".to_owned()
}

fn default_line_color() -> String {
    "#2563eb".to_owned()
}

const fn default_estimator_window() -> usize {
    20
}

const fn default_estimator_ttl_secs() -> u64 {
    60
}

const fn default_intake_max() -> u64 {
    5
}

const fn default_intake_window_secs() -> u64 {
    600
}

const fn default_open_hour() -> u32 {
    8
}

const fn default_close_hour() -> u32 {
    22
}

const fn default_true() -> bool {
    true
}

const fn default_reset_hour() -> u32 {
    4
}

fn default_line_push_url() -> String {
    "https://api.line.me/v2/bot/message/push".to_owned()
}

const fn default_user_role() -> Role {
    Role::Operator
}

fn default_admin_nickname() -> String {
    "Administrator".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CallsysConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.passed_cap, 20);
        assert_eq!(config.queue.proximity_lookahead, 5);
        assert_eq!(config.estimator.window, 20);
        assert_eq!(config.sessions.ttl_secs, 86_400);
        assert_eq!(config.infrastructure.port, 3000);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r##"
infrastructure:
  dragonfly_url: "redis://df:6379"
  port: 8081
queue:
  passed_cap: 10
  proximity_lookahead: 3
  default_line:
    name: "Pharmacy"
    prefix: "P"
estimator:
  window: 8
business_hours:
  enabled: true
  open_hour: 9
  close_hour: 17
clock:
  utc_offset_minutes: 480
notifications:
  templates:
    arrival: "Go to {{ line }} now"
users:
  - username: alice
    password: secret
    role: manager
    nickname: Alice
  - username: bob
    password: hunter2
"##;
        let config = CallsysConfig::parse_without_env(yaml).unwrap();
        assert_eq!(
            config.infrastructure.dragonfly_url.as_deref(),
            Some("redis://df:6379")
        );
        assert_eq!(config.infrastructure.port, 8081);
        assert_eq!(config.queue.passed_cap, 10);
        assert_eq!(config.queue.default_line.prefix, "P");
        assert_eq!(config.queue.default_line.color, "#2563eb");
        assert_eq!(config.estimator.cache_ttl_secs, 60);
        assert!(config.business_hours.enabled);
        assert_eq!(config.clock.utc_offset_minutes, 480);
        assert_eq!(
            config.notifications.templates.arrival.as_deref(),
            Some("Go to {{ line }} now")
        );
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].role, Role::Manager);
        assert_eq!(config.users[1].role, Role::Operator);
        assert_eq!(config.users[1].display_name(), "bob");
    }

    #[test]
    fn parse_empty_yaml() {
        let config = CallsysConfig::parse_without_env("").unwrap();
        assert_eq!(config, CallsysConfig::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = CallsysConfig::parse_without_env("queue:\n  passed_cap: 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "queue.passed_cap",
                ..
            })
        ));
    }

    #[test]
    fn empty_business_window_is_rejected_only_when_enabled() {
        let yaml = "business_hours:\n  enabled: true\n  open_hour: 9\n  close_hour: 9\n";
        let config = CallsysConfig::parse_without_env(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "business_hours",
                ..
            })
        ));

        let yaml = "business_hours:\n  enabled: false\n  open_hour: 9\n  close_hour: 9\n";
        let config = CallsysConfig::parse_without_env(yaml).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn admin_password_creates_or_updates_admin() {
        let mut config = CallsysConfig::default();
        config.set_admin_password("first");
        config.set_admin_password("second");
        let admins: Vec<&UserConfig> =
            config.users.iter().filter(|u| u.username == "admin").collect();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].password, "second");
        assert_eq!(admins[0].role, Role::Admin);
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../callsys-config.yaml");
        let yaml = std::fs::read_to_string(path).unwrap();
        let config = CallsysConfig::parse_without_env(&yaml).unwrap();
        assert!(config.validate().is_ok());
        assert!(!config.users.is_empty());
    }
}
