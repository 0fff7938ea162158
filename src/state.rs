use crate::config::Config;
use crate::upstream::UpstreamClient;

/// Read-only state shared by every handler through the request depot.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, String> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self { config, upstream })
    }
}
