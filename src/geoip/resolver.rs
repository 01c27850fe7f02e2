use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use crate::collab::Location;
use crate::Result;

const LANG: &str = "en";

/// Read-only view over a DB-IP / MaxMind city database.
pub struct GeoIpResolver {
    reader: Reader<Vec<u8>>,
}

impl GeoIpResolver {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }

    /// English country and city names. Unparsable and unknown addresses
    /// are a miss, not an error.
    pub fn lookup(&self, ip: &str) -> Result<Option<Location>> {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            return Ok(None);
        };

        let city: geoip2::City = match self.reader.lookup(addr) {
            Ok(city) => city,
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let location = Location {
            country: english_name(city.country.and_then(|c| c.names)),
            city: english_name(city.city.and_then(|c| c.names)),
        };
        if location.country.is_empty() && location.city.is_empty() {
            return Ok(None);
        }
        Ok(Some(location))
    }

    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    pub fn build_epoch(&self) -> u64 {
        self.reader.metadata.build_epoch
    }
}

fn english_name(names: Option<BTreeMap<&str, &str>>) -> String {
    names
        .and_then(|n| n.get(LANG).map(|s| s.to_string()))
        .unwrap_or_default()
}
