//! Server configuration.

use std::time::Duration;

use ladder_engine::DEFAULT_SCAN_PERIOD;
use melsec_frame::Series;

/// Configuration for constructing a mock PLC server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port (0 picks an ephemeral port).
    pub port: u16,
    /// Frame family served on every connection.
    pub series: Series,
    /// CPU model name answered to model-read requests.
    pub cpu_model: String,
    /// CPU model code answered alongside the name.
    pub cpu_model_code: u16,
    /// Ladder engine scan period.
    pub scan_period: Duration,
}

impl ServerConfig {
    /// Defaults for a series: Q answers as a Q03UDE CPU, iQ-R as an R04.
    #[must_use]
    pub fn for_series(series: Series) -> Self {
        let (cpu_model, cpu_model_code) = match series {
            Series::Q => ("Q03UDECPU", 0x0263),
            Series::IqR => ("R04CPU", 0x4144),
        };
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            series,
            cpu_model: cpu_model.to_string(),
            cpu_model_code,
            scan_period: DEFAULT_SCAN_PERIOD,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::for_series(Series::Q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.series, Series::Q);
        assert_eq!(config.cpu_model, "Q03UDECPU");
        assert_eq!(config.scan_period, Duration::from_millis(10));
    }

    #[test]
    fn iqr_answers_as_r_series_cpu() {
        let config = ServerConfig::for_series(Series::IqR);
        assert_eq!(config.cpu_model, "R04CPU");
    }
}
