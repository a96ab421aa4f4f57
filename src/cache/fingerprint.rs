//! Content fingerprints for projection requests

use serde::Serialize;
use std::fmt;

use crate::error::EngineError;
use crate::formula::SandboxConfig;
use crate::model::{Component, Horizon, LifeEvent, Scenario};
use crate::money::Money;
use crate::projection::ProjectionConfig;

/// Hashed ahead of every input; bump when the encoding or the projection
/// semantics change
const DOMAIN_TAG: &str = "household-projection/v1";

/// blake3 digest identifying the inputs of one projection
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub(crate) blake3::Hash);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.0.to_hex()[..16])
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    domain: &'static str,
    components: &'a [Component],
    events: &'a [LifeEvent],
    horizon: &'a Horizon,
    opening_balance: Money,
    sandbox: &'a SandboxConfig,
}

/// Fingerprint the content that determines a projection's rows
///
/// The scenario id and name are excluded, so identical definitions share a
/// fingerprint. Component and event order is significant.
pub fn fingerprint(
    scenario: &Scenario,
    horizon: &Horizon,
    opening_balance: Money,
    config: &ProjectionConfig,
) -> Result<Fingerprint, EngineError> {
    let input = FingerprintInput {
        domain: DOMAIN_TAG,
        components: &scenario.components,
        events: &scenario.events,
        horizon,
        opening_balance,
        sandbox: &config.sandbox,
    };

    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, &input)
        .map_err(|e| EngineError::invalid(format!("scenario '{}' could not be encoded: {}", scenario.id, e)))?;
    Ok(Fingerprint(hasher.finalize()))
}
