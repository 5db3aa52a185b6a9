use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for messaging, the publication manager and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub messaging: MessagingSettings,
    pub publication: PublicationSettings,
    pub logging: LoggingSettings,
}

/// Settings used by the message factory and sender.
#[derive(Debug, Deserialize, Clone)]
pub struct MessagingSettings {
    /// Extra TTL added to forward-direction messages.
    pub ttl_uplift_ms: u64,
    /// Address attached as `replyTo` to non-local messages. Empty means none.
    pub reply_to_address: String,
    pub default_ttl_ms: u64,
}

/// Settings used by the publication manager.
#[derive(Debug, Deserialize, Clone)]
pub struct PublicationSettings {
    pub max_threads: usize,
    pub storage_path: String,
    pub attribute_subscriptions_key: String,
    pub broadcast_subscriptions_key: String,
    /// TTL of the error reply sent for a subscription that already ended.
    pub expired_reply_ttl_ms: u64,
    /// Distance kept from the largest representable time when scheduling
    /// the end of a publication.
    pub end_tolerance_ms: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Settings as read from files and env, any of which may be missing.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub messaging: Option<PartialMessagingSettings>,
    pub publication: Option<PartialPublicationSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialMessagingSettings {
    pub ttl_uplift_ms: Option<u64>,
    pub reply_to_address: Option<String>,
    pub default_ttl_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPublicationSettings {
    pub max_threads: Option<usize>,
    pub storage_path: Option<String>,
    pub attribute_subscriptions_key: Option<String>,
    pub broadcast_subscriptions_key: Option<String>,
    pub expired_reply_ttl_ms: Option<u64>,
    pub end_tolerance_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

pub const DEFAULT_EXPIRED_REPLY_TTL_MS: u64 = 60_000;
pub const DEFAULT_END_TOLERANCE_MS: i64 = 60 * 60 * 1000;

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            ttl_uplift_ms: 0,
            reply_to_address: String::new(),
            default_ttl_ms: 60_000,
        }
    }
}

impl Default for PublicationSettings {
    fn default() -> Self {
        Self {
            max_threads: 1,
            storage_path: "switchyard_db".to_string(),
            attribute_subscriptions_key: "attribute_subscription_requests".to_string(),
            broadcast_subscriptions_key: "broadcast_subscription_requests".to_string(),
            expired_reply_ttl_ms: DEFAULT_EXPIRED_REPLY_TTL_MS,
            end_tolerance_ms: DEFAULT_END_TOLERANCE_MS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            messaging: MessagingSettings::default(),
            publication: PublicationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();

        let messaging = match self.messaging {
            Some(m) => MessagingSettings {
                ttl_uplift_ms: m.ttl_uplift_ms.unwrap_or(default.messaging.ttl_uplift_ms),
                reply_to_address: m
                    .reply_to_address
                    .unwrap_or(default.messaging.reply_to_address),
                default_ttl_ms: m.default_ttl_ms.unwrap_or(default.messaging.default_ttl_ms),
            },
            None => default.messaging,
        };

        let publication = match self.publication {
            Some(p) => PublicationSettings {
                max_threads: p.max_threads.unwrap_or(default.publication.max_threads),
                storage_path: p.storage_path.unwrap_or(default.publication.storage_path),
                attribute_subscriptions_key: p
                    .attribute_subscriptions_key
                    .unwrap_or(default.publication.attribute_subscriptions_key),
                broadcast_subscriptions_key: p
                    .broadcast_subscriptions_key
                    .unwrap_or(default.publication.broadcast_subscriptions_key),
                expired_reply_ttl_ms: p
                    .expired_reply_ttl_ms
                    .unwrap_or(default.publication.expired_reply_ttl_ms),
                end_tolerance_ms: p
                    .end_tolerance_ms
                    .unwrap_or(default.publication.end_tolerance_ms),
            },
            None => default.publication,
        };

        let logging = LoggingSettings {
            level: self
                .logging
                .and_then(|l| l.level)
                .unwrap_or(default.logging.level),
        };

        Settings {
            messaging,
            publication,
            logging,
        }
    }
}
