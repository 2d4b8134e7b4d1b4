//! Cover image URL resolution.
//!
//! The store keeps only object-storage keys; responses carry public URLs.
//! Resolution is pure -- upload and deletion belong to the media pipeline,
//! which is not this crate's concern.

/// Maps a cover storage key to a public URL.
pub trait CoverResolver: Send + Sync {
    /// `None` (or an empty key) resolves to no URL; resolution never fails.
    fn resolve(&self, key: Option<&str>) -> Option<String>;
}

/// Resolver for the standard deployment layout.
///
/// Keys with a directory component live in the object store and are served
/// through the application's `/media/` proxy, or straight from the store when
/// a direct base URL is configured and preferred.  Bare filenames predate the
/// object store and still sit under `/uploads/covers/` on the app host.
#[derive(Debug, Clone)]
pub struct PublicUrlResolver {
    app_base_url: String,
    direct_base_url: Option<String>,
    prefer_direct: bool,
}

impl PublicUrlResolver {
    pub fn new(app_base_url: impl Into<String>) -> Self {
        Self {
            app_base_url: app_base_url.into(),
            direct_base_url: None,
            prefer_direct: false,
        }
    }

    /// Configure a direct object-store base URL, optionally preferring it
    /// over the `/media/` proxy.
    pub fn with_direct(mut self, base_url: impl Into<String>, prefer: bool) -> Self {
        self.direct_base_url = Some(base_url.into());
        self.prefer_direct = prefer;
        self
    }
}

impl CoverResolver for PublicUrlResolver {
    fn resolve(&self, key: Option<&str>) -> Option<String> {
        let key = key?;
        if key.is_empty() {
            return None;
        }

        let app = self.app_base_url.trim_end_matches('/');

        // Legacy flat filenames were stored on local disk.
        if !key.contains('/') {
            return Some(format!("{app}/uploads/covers/{key}"));
        }

        if self.prefer_direct {
            if let Some(direct) = &self.direct_base_url {
                return Some(format!("{}/{key}", direct.trim_end_matches('/')));
            }
        }

        Some(format!("{app}/media/{}", key.trim_start_matches('/')))
    }
}
