//! Transaction records submitted for analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel used when a transaction carries no device identifier
pub const UNKNOWN_DEVICE: &str = "unknown_device";

/// Sentinel used when a transaction carries no IP address
pub const UNKNOWN_IP: &str = "unknown_ip";

fn default_currency() -> String {
    "USD".to_string()
}

/// A single payment transaction.
///
/// Transactions are created by the caller and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier
    pub id: String,

    /// Customer that initiated the transaction
    pub customer_id: String,

    /// Account debited by the transaction
    pub account_id: String,

    /// Receiving merchant
    pub merchant_id: String,

    /// Device fingerprint, if captured
    #[serde(default)]
    pub device_id: Option<String>,

    /// Originating IP address, if captured
    #[serde(default)]
    pub ip_address: Option<String>,

    /// Transaction amount (non-negative)
    pub amount: f64,

    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Time the transaction occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// Channel the transaction came through, e.g. POS, WEB, MOBILE
    pub channel: String,

    /// Country of origin, if known
    #[serde(default)]
    pub country: Option<String>,
}

impl Transaction {
    /// Create a transaction with the required fields; optional fields are left empty.
    pub fn new(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        account_id: impl Into<String>,
        merchant_id: impl Into<String>,
        amount: f64,
        timestamp: DateTime<Utc>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            account_id: account_id.into(),
            merchant_id: merchant_id.into(),
            device_id: None,
            ip_address: None,
            amount,
            currency: default_currency(),
            timestamp,
            channel: channel.into(),
            country: None,
        }
    }

    /// Attach a device identifier
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Attach an originating IP address
    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    /// Attach a country of origin
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Override the currency
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Device identifier, or the `unknown_device` sentinel
    pub fn device_key(&self) -> &str {
        self.device_id.as_deref().unwrap_or(UNKNOWN_DEVICE)
    }

    /// IP address, or the `unknown_ip` sentinel
    pub fn ip_key(&self) -> &str {
        self.ip_address.as_deref().unwrap_or(UNKNOWN_IP)
    }
}
