//! Parameters supplied by the embedding shell

use serde::{Deserialize, Serialize};

use crate::engine::{OpenOptions, Source};

/// Default page (1-based)
pub const DEFAULT_PAGE: usize = 1;
/// Default logical scale
pub const DEFAULT_SCALE: f64 = 1.0;

const WORKER_SRC_TEMPLATE: &str = "//cdnjs.cloudflare.com/ajax/libs/pdf.js/{version}/pdf.worker.js";

/// Everything that decides what is displayed
#[derive(Clone, Debug)]
pub struct DisplayParams {
    /// Document to show; `None` shows nothing
    pub source: Option<Source>,
    /// 1-based page number
    pub page: usize,
    /// Logical scale, 1.0 = natural size
    pub scale: f64,
    /// Extra clockwise rotation in degrees on top of the page's own
    pub rotation: i32,
    /// Send credentials along with document requests
    pub with_credentials: bool,
    /// Character map location
    pub cmap_url: Option<String>,
    /// Whether character maps are packed; ignored without `cmap_url`
    pub cmap_packed: Option<bool>,
    /// Engine worker location; `None` uses [`default_worker_src`]
    pub worker_src: Option<String>,
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self {
            source: None,
            page: DEFAULT_PAGE,
            scale: DEFAULT_SCALE,
            rotation: 0,
            with_credentials: false,
            cmap_url: None,
            cmap_packed: None,
            worker_src: None,
        }
    }
}

impl DisplayParams {
    #[must_use]
    pub fn with_source(source: Source) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// Options handed to the engine when opening `source`
    #[must_use]
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            with_credentials: self.with_credentials,
            cmap_url: self.cmap_url.clone(),
            cmap_packed: self.cmap_url.as_ref().and(self.cmap_packed),
        }
    }

    /// Worker location to configure for an engine of the given version
    #[must_use]
    pub fn resolved_worker_src(&self, engine_version: &str) -> String {
        self.worker_src
            .clone()
            .unwrap_or_else(|| default_worker_src(engine_version))
    }
}

/// Public CDN location of the worker script for an engine version
#[must_use]
pub fn default_worker_src(version: &str) -> String {
    WORKER_SRC_TEMPLATE.replace("{version}", version)
}

/// Which completion of concurrent document opens wins
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenOrdering {
    /// Every open issued since the source was last cleared is accepted when
    /// it completes; the last one to complete is kept
    #[default]
    CompletionOrder,
    /// Only the most recently issued open is accepted
    RequestOrder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shell_contract() {
        let params = DisplayParams::default();
        assert!(params.source.is_none());
        assert_eq!(params.page, 1);
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.rotation, 0);
        assert!(!params.with_credentials);
    }

    #[test]
    fn cmap_packing_requires_cmap_url() {
        let mut params = DisplayParams {
            cmap_packed: Some(true),
            ..DisplayParams::default()
        };
        assert_eq!(params.open_options().cmap_packed, None);

        params.cmap_url = Some("/cmaps/".into());
        let options = params.open_options();
        assert_eq!(options.cmap_url.as_deref(), Some("/cmaps/"));
        assert_eq!(options.cmap_packed, Some(true));
    }

    #[test]
    fn worker_src_defaults_to_versioned_cdn() {
        let params = DisplayParams::default();
        assert_eq!(
            params.resolved_worker_src("2.16.105"),
            "//cdnjs.cloudflare.com/ajax/libs/pdf.js/2.16.105/pdf.worker.js"
        );

        let custom = DisplayParams {
            worker_src: Some("/static/worker.js".into()),
            ..DisplayParams::default()
        };
        assert_eq!(custom.resolved_worker_src("2.16.105"), "/static/worker.js");
    }
}
