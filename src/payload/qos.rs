use serde::{Deserialize, Serialize};

use crate::utils::time::now_ms;

/// Sentinel expiry meaning "never ends".
pub const NO_EXPIRY_DATE: i64 = 0;
pub const DEFAULT_PUBLICATION_TTL_MS: i64 = 10_000;

fn default_publication_ttl_ms() -> i64 {
    DEFAULT_PUBLICATION_TTL_MS
}

/// Subscription quality of service. Fields shared by every variant are
/// hoisted here; variant-specific intervals live in [`QosKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionQos {
    #[serde(rename = "expiryDateMs")]
    pub expiry_date_ms: i64,
    #[serde(rename = "publicationTtlMs", default = "default_publication_ttl_ms")]
    pub publication_ttl_ms: i64,
    #[serde(flatten)]
    pub kind: QosKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_typeName")]
pub enum QosKind {
    /// Publishes every `period_ms` regardless of change.
    #[serde(rename = "joynr.PeriodicSubscriptionQos")]
    Periodic {
        #[serde(rename = "periodMs")]
        period_ms: i64,
        #[serde(rename = "alertAfterIntervalMs")]
        alert_after_interval_ms: i64,
    },

    /// Publishes on change, at most once per `min_interval_ms`.
    #[serde(rename = "joynr.OnChangeSubscriptionQos")]
    OnChange {
        #[serde(rename = "minIntervalMs")]
        min_interval_ms: i64,
    },

    /// On change, plus a keep-alive publication every `max_interval_ms`.
    #[serde(rename = "joynr.OnChangeWithKeepAliveSubscriptionQos")]
    OnChangeWithKeepAlive {
        #[serde(rename = "minIntervalMs")]
        min_interval_ms: i64,
        #[serde(rename = "maxIntervalMs")]
        max_interval_ms: i64,
        #[serde(rename = "alertAfterIntervalMs")]
        alert_after_interval_ms: i64,
    },

    #[serde(rename = "joynr.MulticastSubscriptionQos")]
    Multicast {},
}

impl SubscriptionQos {
    pub fn new(kind: QosKind) -> Self {
        Self {
            expiry_date_ms: NO_EXPIRY_DATE,
            publication_ttl_ms: DEFAULT_PUBLICATION_TTL_MS,
            kind,
        }
    }

    pub fn periodic(period_ms: i64) -> Self {
        Self::new(QosKind::Periodic {
            period_ms,
            alert_after_interval_ms: 0,
        })
    }

    pub fn on_change(min_interval_ms: i64) -> Self {
        Self::new(QosKind::OnChange { min_interval_ms })
    }

    pub fn on_change_with_keep_alive(min_interval_ms: i64, max_interval_ms: i64) -> Self {
        Self::new(QosKind::OnChangeWithKeepAlive {
            min_interval_ms,
            max_interval_ms,
            alert_after_interval_ms: 0,
        })
    }

    pub fn multicast() -> Self {
        Self::new(QosKind::Multicast {})
    }

    pub fn with_expiry_date_ms(mut self, expiry_date_ms: i64) -> Self {
        self.expiry_date_ms = expiry_date_ms;
        self
    }

    /// Sets the expiry relative to now.
    pub fn with_validity_ms(self, validity_ms: i64) -> Self {
        self.with_expiry_date_ms(now_ms().saturating_add(validity_ms))
    }

    pub fn with_publication_ttl_ms(mut self, publication_ttl_ms: i64) -> Self {
        self.publication_ttl_ms = publication_ttl_ms;
        self
    }

    pub fn has_expiry(&self) -> bool {
        self.expiry_date_ms != NO_EXPIRY_DATE
    }

    /// True when the expiry is set and lies before `now + offset_ms`.
    pub fn is_expired_with_offset(&self, offset_ms: i64) -> bool {
        self.has_expiry() && self.expiry_date_ms < now_ms().saturating_add(offset_ms)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_with_offset(0)
    }

    /// Whether an attribute listener has to be registered.
    pub fn is_on_change(&self) -> bool {
        matches!(
            self.kind,
            QosKind::OnChange { .. } | QosKind::OnChangeWithKeepAlive { .. }
        )
    }

    /// Interval of the periodic component, if any.
    pub fn periodic_interval_ms(&self) -> Option<i64> {
        match self.kind {
            QosKind::Periodic { period_ms, .. } => Some(period_ms),
            QosKind::OnChangeWithKeepAlive {
                max_interval_ms, ..
            } => Some(max_interval_ms),
            _ => None,
        }
        .filter(|interval| *interval > 0)
    }

    /// Debounce window between two publications; zero when unrestricted.
    pub fn min_interval_ms(&self) -> i64 {
        match self.kind {
            QosKind::OnChange { min_interval_ms }
            | QosKind::OnChangeWithKeepAlive {
                min_interval_ms, ..
            } => min_interval_ms.max(0),
            _ => 0,
        }
    }
}
