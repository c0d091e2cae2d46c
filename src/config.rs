//! Environment configuration.

use std::str::FromStr;
use rust_decimal::Decimal;
use thiserror::Error;
use crate::domain::pricing::PricingPolicy;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key} is not valid: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub tax_rate: Decimal,
    pub fixed_surcharge: Decimal,
    pub currency: String,
    /// Token accepted by the in-memory backend of the demo service.
    pub demo_auth_token: String,
}

impl Default for Config {
    fn default() -> Self {
        let pricing = PricingPolicy::default();
        Self {
            port: 8083,
            tax_rate: pricing.tax_rate,
            fixed_surcharge: pricing.fixed_surcharge,
            currency: pricing.currency,
            demo_auth_token: "demo-token".to_string(),
        }
    }
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let tax_rate = parse(&lookup, "TAX_RATE", defaults.tax_rate)?;
        let fixed_surcharge = parse(&lookup, "FIXED_SURCHARGE", defaults.fixed_surcharge)?;
        if tax_rate.is_sign_negative() {
            return Err(ConfigError::Invalid { key: "TAX_RATE", value: tax_rate.to_string() });
        }
        if fixed_surcharge.is_sign_negative() {
            return Err(ConfigError::Invalid { key: "FIXED_SURCHARGE", value: fixed_surcharge.to_string() });
        }
        Ok(Self {
            port: parse(&lookup, "PORT", defaults.port)?,
            tax_rate,
            fixed_surcharge,
            currency: lookup("CURRENCY").unwrap_or(defaults.currency),
            demo_auth_token: lookup("DEMO_AUTH_TOKEN").unwrap_or(defaults.demo_auth_token),
        })
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy { tax_rate: self.tax_rate, fixed_surcharge: self.fixed_surcharge, currency: self.currency.clone() }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
