//! HTTP client for the land-proximity oracle.
//!
//! The oracle is a remote procedure that counts how many of a device's
//! positions on a UTC day lie within a distance of any coastline. It is
//! called with a JSON body and answers with a bare integer:
//!
//! ```text
//! POST <url>
//! {"p_device_uid": "SV-0042", "p_check_date": "2025-06-01", "p_threshold_meters": 804.67}
//!
//! 0
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use time::Date;
use tracing::debug;

use seastreak_core::{Error, LandProximityOracle, Result};
use seastreak_types::format_date;

use crate::config::OracleConfig;

#[derive(Debug, Serialize)]
struct NearLandQuery<'a> {
    p_device_uid: &'a str,
    p_check_date: String,
    p_threshold_meters: f64,
}

/// Land-proximity oracle reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLandOracle {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpLandOracle {
    /// Build a client from configuration.
    pub fn new(config: &OracleConfig) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl LandProximityOracle for HttpLandOracle {
    async fn count_near_land(
        &self,
        device_uid: &str,
        date: Date,
        threshold_meters: f64,
    ) -> Result<u32> {
        let query = NearLandQuery {
            p_device_uid: device_uid,
            p_check_date: format_date(date),
            p_threshold_meters: threshold_meters,
        };

        let mut request = self.client.post(&self.url).json(&query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let count = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(Error::oracle)?
            .json::<u32>()
            .await
            .map_err(Error::oracle)?;

        debug!(
            "Oracle reports {} position(s) near land for {} on {}",
            count, device_uid, date
        );

        Ok(count)
    }
}
