//! Fault injection used to exercise the error and telemetry paths.
//!
//! A [`ChaosInjector`] is called at the top of repository and service
//! operations. Depending on its [`ChaosConfig`] it may sleep for a bounded
//! random delay and may return a synthetic [`AppError`] drawn from a
//! business or application catalog.

use std::time::Duration;

use rand::Rng;

use crate::error::{AppError, ErrorCategory, ErrorCode};

const DEFAULT_ERROR_CHANCE: f64 = 0.1;
const SIMULATED_SUFFIX: &str = " [simulated]";

/// Fault injection settings.
///
/// Reads from environment variables:
/// - `SIMULATE_DELAY_ENABLED` (default: `false`)
/// - `SIMULATE_DELAY_MIN_MS` / `SIMULATE_DELAY_MAX_MS` (default: `10` / `100`)
/// - `SIMULATE_RANDOM_ERROR_ENABLED` (default: `false`)
/// - `SIMULATE_OVERALL_ERROR_CHANCE` (default: `0.1`)
/// - `SIMULATE_APPLICATION_ERROR_WEIGHT` / `SIMULATE_BUSINESS_ERROR_WEIGHT` (default: `1` / `1`)
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosConfig {
    pub delay_enabled: bool,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub error_enabled: bool,
    pub error_chance: f64,
    pub application_weight: u32,
    pub business_weight: u32,
}

impl ChaosConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            delay_enabled: env_or("SIMULATE_DELAY_ENABLED", defaults.delay_enabled),
            delay_min_ms: env_or("SIMULATE_DELAY_MIN_MS", defaults.delay_min_ms),
            delay_max_ms: env_or("SIMULATE_DELAY_MAX_MS", defaults.delay_max_ms),
            error_enabled: env_or("SIMULATE_RANDOM_ERROR_ENABLED", defaults.error_enabled),
            error_chance: env_or("SIMULATE_OVERALL_ERROR_CHANCE", defaults.error_chance),
            application_weight: env_or(
                "SIMULATE_APPLICATION_ERROR_WEIGHT",
                defaults.application_weight,
            ),
            business_weight: env_or("SIMULATE_BUSINESS_ERROR_WEIGHT", defaults.business_weight),
        }
    }

    /// The configured delay range, if it is usable.
    fn delay_range(&self) -> Option<(u64, u64)> {
        (self.delay_enabled && self.delay_max_ms > 0 && self.delay_min_ms < self.delay_max_ms)
            .then_some((self.delay_min_ms, self.delay_max_ms))
    }

    /// The configured error chance, replaced by the default when out of `(0, 1]`.
    fn effective_error_chance(&self) -> f64 {
        if self.error_chance <= 0.0 || self.error_chance > 1.0 || self.error_chance.is_nan() {
            DEFAULT_ERROR_CHANCE
        } else {
            self.error_chance
        }
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            delay_enabled: false,
            delay_min_ms: 10,
            delay_max_ms: 100,
            error_enabled: false,
            error_chance: DEFAULT_ERROR_CHANCE,
            application_weight: 1,
            business_weight: 1,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Template for a synthetic error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedError {
    pub code: ErrorCode,
    pub message: &'static str,
}

impl SimulatedError {
    pub const fn new(code: ErrorCode, message: &'static str) -> Self {
        Self { code, message }
    }
}

pub const DEFAULT_APPLICATION_ERRORS: &[SimulatedError] = &[
    SimulatedError::new(ErrorCode::DatabaseAccess, "Simulated database access error"),
    SimulatedError::new(ErrorCode::ServiceUnavailable, "Simulated service unavailability"),
    SimulatedError::new(ErrorCode::RequestValidation, "Simulated request validation error"),
    SimulatedError::new(ErrorCode::InternalProcessing, "Simulated internal processing error"),
    SimulatedError::new(ErrorCode::SystemPanic, "Simulated system panic event"),
    SimulatedError::new(ErrorCode::MalformedData, "Simulated malformed data error"),
    SimulatedError::new(ErrorCode::NetworkError, "Simulated network error"),
];

pub const DEFAULT_BUSINESS_ERRORS: &[SimulatedError] = &[
    SimulatedError::new(ErrorCode::ProductNotFound, "Simulated product not found error"),
    SimulatedError::new(ErrorCode::InsufficientStock, "Simulated insufficient stock error"),
    SimulatedError::new(ErrorCode::InvalidProductData, "Simulated invalid product data"),
];

/// Injects delays and synthetic errors according to a [`ChaosConfig`].
#[derive(Debug, Clone)]
pub struct ChaosInjector {
    config: ChaosConfig,
    application_errors: Vec<SimulatedError>,
    business_errors: Vec<SimulatedError>,
}

impl ChaosInjector {
    /// Creates an injector with the default catalogs.
    pub fn new(config: ChaosConfig) -> Self {
        Self {
            config,
            application_errors: DEFAULT_APPLICATION_ERRORS.to_vec(),
            business_errors: DEFAULT_BUSINESS_ERRORS.to_vec(),
        }
    }

    /// An injector that never delays and never fails.
    pub fn disabled() -> Self {
        Self::new(ChaosConfig::default())
    }

    /// Replaces both synthetic error catalogs.
    pub fn with_catalogs(
        mut self,
        application_errors: Vec<SimulatedError>,
        business_errors: Vec<SimulatedError>,
    ) -> Self {
        self.application_errors = application_errors;
        self.business_errors = business_errors;
        self
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Runs one simulation step: optional delay, then optional error.
    pub async fn simulate(&self) -> Result<(), AppError> {
        let (delay, outcome) = {
            let mut rng = rand::thread_rng();
            (self.pick_delay(&mut rng), self.pick_error(&mut rng))
        };

        if let Some(delay) = delay {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "simulating delay");
            tokio::time::sleep(delay).await;
        }

        match outcome {
            Some(err) => {
                tracing::debug!(code = %err.code(), category = %err.category(), "simulating error");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Chooses the delay for one call, if delays are enabled and well formed.
    pub fn pick_delay<G: Rng>(&self, rng: &mut G) -> Option<Duration> {
        let (min, max) = self.config.delay_range()?;
        Some(Duration::from_millis(rng.gen_range(min..=max)))
    }

    /// Decides whether this call fails and, if so, with which error.
    pub fn pick_error<G: Rng>(&self, rng: &mut G) -> Option<AppError> {
        if !self.config.error_enabled {
            return None;
        }
        if !rng.gen_bool(self.config.effective_error_chance()) {
            return None;
        }

        let app_weight = self.config.application_weight;
        let biz_weight = self.config.business_weight;
        let can_app = app_weight > 0 && !self.application_errors.is_empty();
        let can_biz = biz_weight > 0 && !self.business_errors.is_empty();

        let category = match (can_app, can_biz) {
            (true, false) => ErrorCategory::Application,
            (false, true) => ErrorCategory::Business,
            (true, true) => {
                let total = u64::from(app_weight) + u64::from(biz_weight);
                if rng.gen_range(0..total) < u64::from(app_weight) {
                    ErrorCategory::Application
                } else {
                    ErrorCategory::Business
                }
            }
            (false, false) => return None,
        };

        let catalog = match category {
            ErrorCategory::Application => &self.application_errors,
            ErrorCategory::Business => &self.business_errors,
        };
        let blueprint = &catalog[rng.gen_range(0..catalog.len())];
        let message = format!("{}{SIMULATED_SUFFIX}", blueprint.message);

        Some(match category {
            ErrorCategory::Business => AppError::business(blueprint.code, message),
            ErrorCategory::Application => AppError::application(blueprint.code, message),
        })
    }
}

impl Default for ChaosInjector {
    fn default() -> Self {
        Self::disabled()
    }
}
