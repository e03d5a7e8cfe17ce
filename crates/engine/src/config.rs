//! Engine configuration

use bdtp_types::{AssetAmount, ChainAddress, FlowType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the orchestrator and its polling loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address payments must be sent to.
    #[serde(default = "default_treasury")]
    pub treasury_address: ChainAddress,

    /// Fixed registration fee.
    #[serde(default = "default_register_fee")]
    pub register_fee: AssetAmount,

    /// Fixed report deposit.
    #[serde(default = "default_report_deposit")]
    pub report_deposit: AssetAmount,

    /// Seconds between payment-wait polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Consecutive transient poll failures absorbed per tick.
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    /// Seconds between in-tick retries after a transient failure.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Payment-wait ceiling for purchase sessions, seconds.
    #[serde(default = "default_purchase_wait")]
    pub purchase_wait_secs: u64,

    /// Payment-wait ceiling for register and report sessions, seconds.
    #[serde(default = "default_long_wait")]
    pub register_wait_secs: u64,

    #[serde(default = "default_long_wait")]
    pub report_wait_secs: u64,

    /// Deadline for one external provenance-detection call, seconds.
    #[serde(default = "default_precheck_timeout")]
    pub precheck_timeout_secs: u64,

    /// Wall-clock budget for adjudication status polling, seconds.
    #[serde(default = "default_long_wait")]
    pub adjudication_wait_secs: u64,

    /// Deadline for one adjudication status call, seconds.
    #[serde(default = "default_status_poll_timeout")]
    pub status_poll_timeout_secs: u64,
}

impl EngineConfig {
    /// Payment-wait wall-clock ceiling for a flow.
    pub fn wait_ceiling(&self, flow: FlowType) -> Duration {
        let secs = match flow {
            FlowType::Purchase => self.purchase_wait_secs,
            FlowType::Register => self.register_wait_secs,
            FlowType::Report => self.report_wait_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn precheck_timeout(&self) -> Duration {
        Duration::from_secs(self.precheck_timeout_secs)
    }

    pub fn adjudication_wait(&self) -> Duration {
        Duration::from_secs(self.adjudication_wait_secs)
    }

    pub fn status_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.status_poll_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            treasury_address: default_treasury(),
            register_fee: default_register_fee(),
            report_deposit: default_report_deposit(),
            poll_interval_secs: default_poll_interval(),
            max_consecutive_failures: default_max_failures(),
            retry_delay_secs: default_retry_delay(),
            purchase_wait_secs: default_purchase_wait(),
            register_wait_secs: default_long_wait(),
            report_wait_secs: default_long_wait(),
            precheck_timeout_secs: default_precheck_timeout(),
            adjudication_wait_secs: default_long_wait(),
            status_poll_timeout_secs: default_status_poll_timeout(),
        }
    }
}

// Well-known local devnet account.
fn default_treasury() -> ChainAddress {
    ChainAddress::parse("0x70997970C51812dc3A010C7d01b50e0d17dc79C8").expect("static address")
}

fn default_register_fee() -> AssetAmount {
    AssetAmount::parse("3").expect("static amount")
}

fn default_report_deposit() -> AssetAmount {
    AssetAmount::parse("2").expect("static amount")
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_failures() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    3
}

fn default_purchase_wait() -> u64 {
    300
}

fn default_long_wait() -> u64 {
    600
}

fn default_precheck_timeout() -> u64 {
    180
}

fn default_status_poll_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flow_ceilings() {
        let config = EngineConfig::default();
        assert_eq!(
            config.wait_ceiling(FlowType::Purchase),
            Duration::from_secs(300)
        );
        assert_eq!(
            config.wait_ceiling(FlowType::Register),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.wait_ceiling(FlowType::Report),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"treasury_address": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"}"#,
        )
        .unwrap();
        assert_eq!(config.register_fee, AssetAmount::parse("3").unwrap());
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.status_poll_timeout_secs, 30);
    }
}
