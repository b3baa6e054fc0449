use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "tv" | "series" => Ok(Self::Tv),
            other => Err(format!("unknown media type '{other}'")),
        }
    }
}

/// Result of one health check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    /// `"ok"`, `"status: <code>"`, or the error message.
    pub detail: String,
}

impl HealthReport {
    pub fn ok() -> Self {
        Self {
            healthy: true,
            detail: "ok".to_owned(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// Result of a catalog lookup by external id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaLookup {
    Found(i64),
    /// The upstream answered 404.
    NotFound,
    /// Not attempted: the upstream is marked unavailable.
    Skipped,
}

impl MediaLookup {
    pub fn media_id(self) -> Option<i64> {
        match self {
            Self::Found(media_id) => Some(media_id),
            Self::NotFound | Self::Skipped => None,
        }
    }
}

/// Cached upstream availability shared by every handle that cloned it.
///
/// Last writer wins; it only gates calls that would be pointless, so no
/// ordering beyond the atomic itself is needed. Every write is mirrored to
/// the `arrsync_overseer_available` gauge.
#[derive(Clone, Debug)]
pub struct Availability(Arc<AtomicBool>);

impl Default for Availability {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl Availability {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, available: bool) {
        self.0.store(available, Ordering::Relaxed);
        crate::stats::record_availability(available);
    }
}

#[cfg(test)]
mod tests {
    use super::{Availability, MediaType};

    #[test]
    fn media_type_renders_path_segment() {
        assert_eq!(MediaType::Movie.to_string(), "movie");
        assert_eq!(MediaType::Tv.as_str(), "tv");
        assert_eq!("Series".parse::<MediaType>(), Ok(MediaType::Tv));
        assert!("music".parse::<MediaType>().is_err());
    }

    #[test]
    fn availability_is_shared_between_clones() {
        let flag = Availability::default();
        let other = flag.clone();
        assert!(other.get());
        flag.set(false);
        assert!(!other.get());
    }
}
