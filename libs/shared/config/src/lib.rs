use std::env;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    /// Seconds between background sweep passes.
    pub sweep_interval_secs: u64,
    pub scheduling: SchedulingConfig,
    pub risk: RiskConfig,
    pub intervention: InterventionConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            server_port: env_or("SERVER_PORT", 3000),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 60),
            scheduling: SchedulingConfig::from_env(),
            risk: RiskConfig::from_env(),
            intervention: InterventionConfig::from_env(),
            storage: StorageConfig::from_env(),
            dispatch: DispatchConfig::from_env(),
        };

        if let Err(issues) = config.risk.validate() {
            warn!("Risk configuration invalid ({}), falling back to defaults", issues.join("; "));
            return Self { risk: RiskConfig::default(), ..config };
        }

        if !config.storage.is_configured() {
            warn!("Storage backend not fully configured - missing environment variables");
        }

        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            sweep_interval_secs: 60,
            scheduling: SchedulingConfig::default(),
            risk: RiskConfig::default(),
            intervention: InterventionConfig::default(),
            storage: StorageConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

// ==============================================================================
// SCHEDULING
// ==============================================================================

/// Ordering applied when two alternative slots are equally far from the
/// requested start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    Earlier,
    Later,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "earlier" => Ok(TieBreak::Earlier),
            "later" => Ok(TieBreak::Later),
            other => Err(format!("unknown tie break '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub alternative_count: usize,
    pub alternative_search_days: u32,
    pub tie_break: TieBreak,
    pub max_duration_minutes: u32,
    pub lock_timeout_ms: u64,
    pub allow_past_bookings: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            alternative_count: 3,
            alternative_search_days: 7,
            tie_break: TieBreak::Earlier,
            max_duration_minutes: 240,
            lock_timeout_ms: 2000,
            allow_past_bookings: false,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            alternative_count: env_or("SCHEDULING_ALTERNATIVE_COUNT", defaults.alternative_count),
            alternative_search_days: env_or("SCHEDULING_ALTERNATIVE_SEARCH_DAYS", defaults.alternative_search_days),
            tie_break: env_or("SCHEDULING_TIE_BREAK", defaults.tie_break),
            max_duration_minutes: env_or("SCHEDULING_MAX_DURATION_MINUTES", defaults.max_duration_minutes),
            lock_timeout_ms: env_or("SCHEDULING_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
            allow_past_bookings: env_or("SCHEDULING_ALLOW_PAST_BOOKINGS", defaults.allow_past_bookings),
        }
    }
}

// ==============================================================================
// RISK
// ==============================================================================

/// Shape of the lead-time risk curve outside the comfortable booking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTimeDecay {
    /// Full penalty as soon as the lead time leaves the comfortable window.
    Step,
    /// Penalty grows linearly with the distance from the comfortable window.
    Linear,
}

impl FromStr for LeadTimeDecay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "step" => Ok(LeadTimeDecay::Step),
            "linear" => Ok(LeadTimeDecay::Linear),
            other => Err(format!("unknown lead time decay '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub history: f64,
    pub lead_time: f64,
    pub slot_history: f64,
    pub insurance: f64,
    pub reminders: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            history: 0.50,
            lead_time: 0.20,
            slot_history: 0.10,
            insurance: 0.10,
            reminders: 0.10,
        }
    }
}

impl RiskWeights {
    fn all(&self) -> [(&'static str, f64); 5] {
        [
            ("history", self.history),
            ("lead_time", self.lead_time),
            ("slot_history", self.slot_history),
            ("insurance", self.insurance),
            ("reminders", self.reminders),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    pub laplace_alpha: f64,
    pub laplace_beta: f64,
    pub short_lead_hours: i64,
    pub long_lead_days: i64,
    pub lead_time_decay: LeadTimeDecay,
    pub linear_ramp_days: i64,
    pub reminder_saturation: u32,
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub medium_threshold: f64,
    pub high_threshold: f64,
    pub recompute_checkpoints_hours: Vec<i64>,
    pub slot_history_lookback_days: i64,
    pub high_risk_no_show_count: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            laplace_alpha: 1.0,
            laplace_beta: 1.0,
            short_lead_hours: 24,
            long_lead_days: 30,
            lead_time_decay: LeadTimeDecay::Step,
            linear_ramp_days: 30,
            reminder_saturation: 2,
            clamp_min: 0.0,
            clamp_max: 1.0,
            medium_threshold: 0.35,
            high_threshold: 0.50,
            recompute_checkpoints_hours: vec![48, 24],
            slot_history_lookback_days: 180,
            high_risk_no_show_count: 3,
        }
    }
}

impl RiskConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            weights: RiskWeights {
                history: env_or("RISK_WEIGHT_HISTORY", defaults.weights.history),
                lead_time: env_or("RISK_WEIGHT_LEAD_TIME", defaults.weights.lead_time),
                slot_history: env_or("RISK_WEIGHT_SLOT_HISTORY", defaults.weights.slot_history),
                insurance: env_or("RISK_WEIGHT_INSURANCE", defaults.weights.insurance),
                reminders: env_or("RISK_WEIGHT_REMINDERS", defaults.weights.reminders),
            },
            laplace_alpha: env_or("RISK_LAPLACE_ALPHA", defaults.laplace_alpha),
            laplace_beta: env_or("RISK_LAPLACE_BETA", defaults.laplace_beta),
            short_lead_hours: env_or("RISK_SHORT_LEAD_HOURS", defaults.short_lead_hours),
            long_lead_days: env_or("RISK_LONG_LEAD_DAYS", defaults.long_lead_days),
            lead_time_decay: env_or("RISK_LEAD_TIME_DECAY", defaults.lead_time_decay),
            linear_ramp_days: env_or("RISK_LINEAR_RAMP_DAYS", defaults.linear_ramp_days),
            reminder_saturation: env_or("RISK_REMINDER_SATURATION", defaults.reminder_saturation),
            clamp_min: env_or("RISK_CLAMP_MIN", defaults.clamp_min),
            clamp_max: env_or("RISK_CLAMP_MAX", defaults.clamp_max),
            medium_threshold: env_or("RISK_MEDIUM_THRESHOLD", defaults.medium_threshold),
            high_threshold: env_or("RISK_HIGH_THRESHOLD", defaults.high_threshold),
            recompute_checkpoints_hours: env_list_or(
                "RISK_RECOMPUTE_CHECKPOINTS_HOURS",
                defaults.recompute_checkpoints_hours,
            ),
            slot_history_lookback_days: env_or("RISK_SLOT_HISTORY_LOOKBACK_DAYS", defaults.slot_history_lookback_days),
            high_risk_no_show_count: env_or("RISK_HIGH_RISK_NO_SHOW_COUNT", defaults.high_risk_no_show_count),
        }
    }

    /// Collects every out-of-range value instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        for (name, weight) in self.weights.all() {
            if !(0.0..=1.0).contains(&weight) {
                issues.push(format!("weight '{}' must be between 0 and 1", name));
            }
        }
        if self.laplace_alpha <= 0.0 || self.laplace_beta <= 0.0 {
            issues.push("Laplace prior must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.clamp_min)
            || !(0.0..=1.0).contains(&self.clamp_max)
            || self.clamp_min > self.clamp_max
        {
            issues.push("clamp bounds must satisfy 0 <= min <= max <= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.medium_threshold)
            || !(0.0..=1.0).contains(&self.high_threshold)
            || self.medium_threshold > self.high_threshold
        {
            issues.push("tier thresholds must satisfy 0 <= medium <= high <= 1".to_string());
        }
        if self.short_lead_hours <= 0 || self.long_lead_days <= 0 || self.linear_ramp_days <= 0 {
            issues.push("lead time windows must be positive".to_string());
        }
        if self.reminder_saturation == 0 {
            issues.push("reminder saturation must be at least 1".to_string());
        }
        if self.recompute_checkpoints_hours.iter().any(|h| *h <= 0) {
            issues.push("recompute checkpoints must be positive hour offsets".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

// ==============================================================================
// INTERVENTION
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub channel_count: usize,
    /// Hours before the appointment at which each touch is sent.
    pub touch_offsets_hours: Vec<i64>,
    pub follow_up_window_minutes: i64,
    pub manual_confirmation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionConfig {
    pub low: TierPolicy,
    pub medium: TierPolicy,
    pub high: TierPolicy,
    pub urgent_window_hours: i64,
    /// Channel names in the order extra channels are added after the
    /// patient's own preferences run out.
    pub escalation_order: Vec<String>,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            low: TierPolicy {
                channel_count: 1,
                touch_offsets_hours: vec![24],
                follow_up_window_minutes: 720,
                manual_confirmation: false,
            },
            medium: TierPolicy {
                channel_count: 2,
                touch_offsets_hours: vec![48, 24],
                follow_up_window_minutes: 360,
                manual_confirmation: false,
            },
            high: TierPolicy {
                channel_count: 2,
                touch_offsets_hours: vec![72, 24, 2],
                follow_up_window_minutes: 120,
                manual_confirmation: true,
            },
            urgent_window_hours: 24,
            escalation_order: vec!["sms".to_string(), "phone".to_string(), "email".to_string()],
        }
    }
}

impl InterventionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            low: TierPolicy {
                channel_count: env_or("INTERVENTION_LOW_CHANNELS", defaults.low.channel_count),
                touch_offsets_hours: env_list_or("INTERVENTION_LOW_TOUCH_HOURS", defaults.low.touch_offsets_hours),
                follow_up_window_minutes: env_or("INTERVENTION_LOW_FOLLOW_UP_MINUTES", defaults.low.follow_up_window_minutes),
                manual_confirmation: defaults.low.manual_confirmation,
            },
            medium: TierPolicy {
                channel_count: env_or("INTERVENTION_MEDIUM_CHANNELS", defaults.medium.channel_count),
                touch_offsets_hours: env_list_or("INTERVENTION_MEDIUM_TOUCH_HOURS", defaults.medium.touch_offsets_hours),
                follow_up_window_minutes: env_or("INTERVENTION_MEDIUM_FOLLOW_UP_MINUTES", defaults.medium.follow_up_window_minutes),
                manual_confirmation: defaults.medium.manual_confirmation,
            },
            high: TierPolicy {
                channel_count: env_or("INTERVENTION_HIGH_CHANNELS", defaults.high.channel_count),
                touch_offsets_hours: env_list_or("INTERVENTION_HIGH_TOUCH_HOURS", defaults.high.touch_offsets_hours),
                follow_up_window_minutes: env_or("INTERVENTION_HIGH_FOLLOW_UP_MINUTES", defaults.high.follow_up_window_minutes),
                manual_confirmation: env_or("INTERVENTION_HIGH_MANUAL_CONFIRMATION", defaults.high.manual_confirmation),
            },
            urgent_window_hours: env_or("INTERVENTION_URGENT_WINDOW_HOURS", defaults.urgent_window_hours),
            escalation_order: env_list_or("INTERVENTION_ESCALATION_ORDER", defaults.escalation_order),
        }
    }
}

// ==============================================================================
// STORAGE / DISPATCH
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Supabase,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "supabase" => Ok(StorageBackend::Supabase),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub supabase_url: String,
    pub supabase_key: String,
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            supabase_url: String::new(),
            supabase_key: String::new(),
            timeout_ms: 3000,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: env_or("STORAGE_BACKEND", defaults.backend),
            supabase_url: env::var("SUPABASE_URL").unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            }),
            supabase_key: env::var("SUPABASE_SERVICE_KEY").unwrap_or_else(|_| {
                warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                String::new()
            }),
            timeout_ms: env_or("STORAGE_TIMEOUT_MS", defaults.timeout_ms),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.backend {
            StorageBackend::Memory => true,
            StorageBackend::Supabase => !self.supabase_url.is_empty() && !self.supabase_key.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchBackend {
    Log,
    Webhook,
}

impl FromStr for DispatchBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(DispatchBackend::Log),
            "webhook" => Ok(DispatchBackend::Webhook),
            other => Err(format!("unknown dispatch backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub backend: DispatchBackend,
    pub webhook_url: String,
    pub timeout_ms: u64,
    pub verification_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend: DispatchBackend::Log,
            webhook_url: String::new(),
            timeout_ms: 3000,
            verification_timeout_ms: 2000,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            backend: env_or("DISPATCH_BACKEND", defaults.backend),
            webhook_url: env::var("DISPATCH_WEBHOOK_URL").unwrap_or_default(),
            timeout_ms: env_or("DISPATCH_TIMEOUT_MS", defaults.timeout_ms),
            verification_timeout_ms: env_or("VERIFICATION_TIMEOUT_MS", defaults.verification_timeout_ms),
        };

        if config.backend == DispatchBackend::Webhook && config.webhook_url.is_empty() {
            warn!("DISPATCH_BACKEND=webhook but DISPATCH_WEBHOOK_URL not set, using log dispatcher");
            return Self { backend: DispatchBackend::Log, ..config };
        }

        config
    }
}

// ==============================================================================
// ENV HELPERS
// ==============================================================================

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("{} has invalid value '{}' ({}), using default {}", key, raw, e, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_list_or<T>(key: &str, default: Vec<T>) -> Vec<T>
where
    T: FromStr,
    T::Err: Display,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };

    let parsed: Result<Vec<T>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect();

    match parsed {
        Ok(values) if !values.is_empty() => values,
        Ok(_) => default,
        Err(e) => {
            warn!("{} has invalid list '{}' ({}), using default", key, raw, e);
            default
        }
    }
}

impl Display for TieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TieBreak::Earlier => write!(f, "earlier"),
            TieBreak::Later => write!(f, "later"),
        }
    }
}

impl Display for LeadTimeDecay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadTimeDecay::Step => write!(f, "step"),
            LeadTimeDecay::Linear => write!(f, "linear"),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Supabase => write!(f, "supabase"),
        }
    }
}

impl Display for DispatchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchBackend::Log => write!(f, "log"),
            DispatchBackend::Webhook => write!(f, "webhook"),
        }
    }
}
