use crate::config::RequestMethod;
use http_probe::{ProbeClient, ProbeError};

/// One readiness request: a status code, or a transport-level failure
pub trait Probe {
    fn probe(&self, method: RequestMethod, url: &str) -> Result<u16, ProbeError>;
}

impl Probe for ProbeClient {
    fn probe(&self, method: RequestMethod, url: &str) -> Result<u16, ProbeError> {
        ProbeClient::probe(self, method.into(), url)
    }
}
