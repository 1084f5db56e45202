//! Server locations and the bucket-location push message.

use std::fmt;

use geode_core::serialization::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};
use geode_core::{GeodeError, Result};

/// Address of a cache server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerLocation {
    host: String,
    port: u16,
}

impl ServerLocation {
    /// Creates a location from a host name and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A server hosting a copy of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketServerLocation {
    location: ServerLocation,
    bucket_id: u32,
    is_primary: bool,
    version: i8,
}

impl BucketServerLocation {
    /// Creates a bucket location.
    pub fn new(location: ServerLocation, bucket_id: u32, is_primary: bool, version: i8) -> Self {
        Self {
            location,
            bucket_id,
            is_primary,
            version,
        }
    }

    /// Returns the server address.
    pub fn location(&self) -> &ServerLocation {
        &self.location
    }

    /// Returns the bucket id.
    pub fn bucket_id(&self) -> u32 {
        self.bucket_id
    }

    /// Returns true if the server holds the primary copy.
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Returns the metadata version byte sent along with requests routed here.
    pub fn version(&self) -> i8 {
        self.version
    }
}

impl fmt::Display for BucketServerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[bucket={}, primary={}, version={}]",
            self.location, self.bucket_id, self.is_primary, self.version
        )
    }
}

/// Pushed by a server when the hosts of a bucket change.
///
/// Layout: region name (tagged string), bucket id (int), location count
/// (array length), then per location host (tagged string), port (int),
/// primary flag (bool) and version (byte).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLocationsUpdate {
    /// Region the bucket belongs to.
    pub region: String,
    /// Bucket whose hosts changed.
    pub bucket_id: u32,
    /// New hosts, in the order the server sent them.
    pub locations: Vec<BucketServerLocation>,
}

impl BucketLocationsUpdate {
    /// Decodes a message body.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut input = ObjectDataInput::new(bytes);
        let region = input
            .read_string()?
            .ok_or_else(|| GeodeError::Protocol("bucket update without region name".into()))?;
        let bucket_id = non_negative(input.read_int()?, "bucket id")?;
        let count = input.read_array_len()?;
        let count = non_negative(count, "location count")? as usize;

        let mut locations = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            let host = input
                .read_string()?
                .ok_or_else(|| GeodeError::Protocol("bucket location without host".into()))?;
            let port = input.read_int()?;
            let port = u16::try_from(port)
                .map_err(|_| GeodeError::Protocol(format!("invalid port {}", port)))?;
            let is_primary = input.read_bool()?;
            let version = input.read_byte()?;
            locations.push(BucketServerLocation::new(
                ServerLocation::new(host, port),
                bucket_id,
                is_primary,
                version,
            ));
        }
        Ok(Self {
            region,
            bucket_id,
            locations,
        })
    }

    /// Encodes the message body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = ObjectDataOutput::new();
        out.write_string(Some(&self.region))?;
        out.write_int(self.bucket_id as i32)?;
        out.write_array_len(self.locations.len() as i32)?;
        for loc in &self.locations {
            out.write_string(Some(loc.location().host()))?;
            out.write_int(i32::from(loc.location().port()))?;
            out.write_bool(loc.is_primary())?;
            out.write_byte(loc.version())?;
        }
        Ok(out.into_bytes())
    }
}

fn non_negative(value: i32, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| GeodeError::Protocol(format!("negative {}: {}", what, value)))
}
