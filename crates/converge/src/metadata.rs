//! EC2-style instance metadata from the link-local service.

use crate::error::{Error, Result};
use fetchkit::Fetcher;

/// Base URL of the metadata service.
pub const METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/";

/// Where this instance runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    /// e.g. `us-east-1a`
    pub availability_zone: String,
    /// Zone without its trailing letter, e.g. `us-east-1`
    pub region: String,
    /// e.g. `i-0abc123`
    pub instance_id: String,
}

impl InstanceMetadata {
    /// Query the metadata service.
    pub fn fetch(fetcher: &dyn Fetcher) -> Result<Self> {
        let availability_zone = get(fetcher, "placement/availability-zone")?;
        let instance_id = get(fetcher, "instance-id")?;
        let region = region_of(&availability_zone)?.to_string();
        log::debug!("instance {instance_id} in {availability_zone}");
        Ok(Self {
            availability_zone,
            region,
            instance_id,
        })
    }
}

fn get(fetcher: &dyn Fetcher, key: &str) -> Result<String> {
    let body = fetcher.get(&format!("{METADATA_URL}{key}"))?;
    let text = String::from_utf8(body)
        .map_err(|_| Error::invalid(format!("metadata {key} is not UTF-8")))?;
    Ok(text.trim().to_string())
}

/// Region of an availability zone: everything but the last character.
pub fn region_of(zone: &str) -> Result<&str> {
    let mut chars = zone.chars();
    match chars.next_back() {
        Some(_) if !chars.as_str().is_empty() => Ok(chars.as_str()),
        _ => Err(Error::invalid(format!("not an availability zone: {zone:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchkit::MockFetcher;

    #[test]
    fn test_fetch() {
        let fetcher = MockFetcher::new()
            .with_response(
                "http://169.254.169.254/latest/meta-data/placement/availability-zone",
                "eu-west-1b\n",
            )
            .with_response("http://169.254.169.254/latest/meta-data/instance-id", "i-0abc");
        let meta = InstanceMetadata::fetch(&fetcher).unwrap();
        assert_eq!(meta.availability_zone, "eu-west-1b");
        assert_eq!(meta.region, "eu-west-1");
        assert_eq!(meta.instance_id, "i-0abc");
    }

    #[test]
    fn test_region_of() {
        assert_eq!(region_of("us-east-1a").unwrap(), "us-east-1");
        assert!(region_of("").is_err());
        assert!(region_of("a").is_err());
    }

    #[test]
    fn test_service_unreachable() {
        let err = InstanceMetadata::fetch(&MockFetcher::new()).unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }
}
