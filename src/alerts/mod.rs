//! Price alerts - One-shot notifications when a price crosses a target

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AnalyticsError, Result};
use crate::types::InstrumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    /// Fires when price >= target
    Above,
    /// Fires when price <= target
    Below,
}

impl AlertCondition {
    pub fn is_met(&self, price: Decimal, target: Decimal) -> bool {
        match self {
            AlertCondition::Above => price >= target,
            AlertCondition::Below => price <= target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: String,
    pub instrument: InstrumentId,
    pub target_price: Decimal,
    pub condition: AlertCondition,
    pub is_active: bool,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<i64>,
    pub message: String,
}

impl PriceAlert {
    /// Active and not yet fired
    pub fn is_armed(&self) -> bool {
        self.is_active && self.triggered_at.is_none()
    }
}

/// Alert list for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertBook {
    alerts: Vec<PriceAlert>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alert and return its id
    pub fn create(
        &mut self,
        instrument: &InstrumentId,
        condition: AlertCondition,
        target_price: Decimal,
        message: impl Into<String>,
        now: i64,
    ) -> Result<String> {
        if target_price <= Decimal::ZERO {
            return Err(AnalyticsError::InvalidSample {
                price: target_price,
            });
        }
        let alert = PriceAlert {
            id: format!("alert_{}", Uuid::new_v4().simple()),
            instrument: instrument.clone(),
            target_price,
            condition,
            is_active: true,
            created_at: now,
            triggered_at: None,
            message: message.into(),
        };
        debug!(id = %alert.id, %instrument, target = %target_price, ?condition, "Alert created");
        let id = alert.id.clone();
        self.alerts.push(alert);
        Ok(id)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut PriceAlert> {
        self.alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AnalyticsError::UnknownAlert(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&PriceAlert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn alerts(&self) -> &[PriceAlert] {
        &self.alerts
    }

    /// Flip the active flag, returning the new value
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        let alert = self.find_mut(id)?;
        alert.is_active = !alert.is_active;
        Ok(alert.is_active)
    }

    pub fn delete(&mut self, id: &str) -> Result<PriceAlert> {
        let idx = self
            .alerts
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| AnalyticsError::UnknownAlert(id.to_string()))?;
        Ok(self.alerts.remove(idx))
    }

    /// Re-arm a triggered alert
    pub fn reset(&mut self, id: &str) -> Result<()> {
        self.find_mut(id)?.triggered_at = None;
        Ok(())
    }

    /// Remove all triggered alerts, returning how many were removed
    pub fn clear_triggered(&mut self) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.triggered_at.is_none());
        before - self.alerts.len()
    }

    pub fn active_count(&self) -> usize {
        self.alerts.iter().filter(|a| a.is_armed()).count()
    }

    pub fn triggered_count(&self) -> usize {
        self.alerts.iter().filter(|a| a.triggered_at.is_some()).count()
    }

    /// Fire every armed alert of `instrument` whose condition holds at `price`.
    ///
    /// Each alert fires at most once until it is reset.
    pub fn check(&mut self, instrument: &InstrumentId, price: Decimal, now: i64) -> Vec<PriceAlert> {
        if price <= Decimal::ZERO {
            return Vec::new();
        }

        let mut fired = Vec::new();
        for alert in self
            .alerts
            .iter_mut()
            .filter(|a| &a.instrument == instrument && a.is_armed())
        {
            if alert.condition.is_met(price, alert.target_price) {
                alert.triggered_at = Some(now);
                info!(
                    id = %alert.id,
                    %instrument,
                    %price,
                    target = %alert.target_price,
                    "Price alert triggered"
                );
                fired.push(alert.clone());
            }
        }
        fired
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }
}
