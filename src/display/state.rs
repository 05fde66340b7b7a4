//! Parameter change tracking
//!
//! Each parameter is bound to exactly one pipeline stage. Applying a command
//! updates the stored parameters and returns the stages that must re-run;
//! an unchanged value yields no effects.

use crate::engine::{Source, same_source};

use super::params::DisplayParams;

/// Last applied display parameters
#[derive(Clone, Debug)]
pub struct WatchState {
    params: DisplayParams,
    worker_configured: bool,
}

impl Default for WatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: DisplayParams::default(),
            worker_configured: false,
        }
    }

    #[must_use]
    pub fn params(&self) -> &DisplayParams {
        &self.params
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetSource(source) => {
                if same_source(self.params.source.as_ref(), source.as_ref()) {
                    return vec![];
                }
                self.params.source = source;
                vec![self.document_effect()]
            }

            Command::SetCredentials(with_credentials) => {
                if self.params.with_credentials == with_credentials {
                    return vec![];
                }
                self.params.with_credentials = with_credentials;
                self.reopen_effects()
            }

            Command::SetCMap { url, packed } => {
                if self.params.cmap_url == url && self.params.cmap_packed == packed {
                    return vec![];
                }
                self.params.cmap_url = url;
                self.params.cmap_packed = packed;
                self.reopen_effects()
            }

            Command::SetPage(page) => {
                if self.params.page == page {
                    return vec![];
                }
                self.params.page = page;
                vec![Effect::LoadPage]
            }

            Command::SetScale(scale) => {
                if self.params.scale.to_bits() == scale.to_bits() {
                    return vec![];
                }
                self.params.scale = scale;
                vec![Effect::RenderCurrentPage]
            }

            Command::SetRotation(rotation) => {
                if self.params.rotation == rotation {
                    return vec![];
                }
                self.params.rotation = rotation;
                vec![Effect::RenderCurrentPage]
            }

            Command::SetWorkerSource(worker_src) => {
                if self.worker_configured && self.params.worker_src == worker_src {
                    return vec![];
                }
                self.worker_configured = true;
                self.params.worker_src = worker_src;
                vec![Effect::ConfigureWorker]
            }
        }
    }

    /// Apply a full parameter set, returning the de-duplicated effects in
    /// execution order
    #[must_use]
    pub fn update(&mut self, params: DisplayParams) -> Vec<Effect> {
        let commands = [
            Command::SetWorkerSource(params.worker_src),
            Command::SetSource(params.source),
            Command::SetCredentials(params.with_credentials),
            Command::SetCMap {
                url: params.cmap_url,
                packed: params.cmap_packed,
            },
            Command::SetPage(params.page),
            Command::SetScale(params.scale),
            Command::SetRotation(params.rotation),
        ];

        let mut effects = Vec::new();
        for cmd in commands {
            effects.extend(self.apply(cmd));
        }
        normalize(effects)
    }

    // Options only matter while there is something to open.
    fn reopen_effects(&self) -> Vec<Effect> {
        if self.params.source.is_some() {
            vec![Effect::OpenDocument]
        } else {
            vec![]
        }
    }

    fn document_effect(&self) -> Effect {
        if self.params.source.is_some() {
            Effect::OpenDocument
        } else {
            Effect::ReleaseDocument
        }
    }
}

/// Sort effects into stage order and drop ones subsumed by another.
///
/// Loading a page always renders it, so a pending page load makes a
/// separate render redundant. Releasing the document leaves nothing to load
/// or render.
#[must_use]
pub fn normalize(mut effects: Vec<Effect>) -> Vec<Effect> {
    effects.sort_by_key(|effect| effect.stage());
    effects.dedup();

    if effects.contains(&Effect::ReleaseDocument) {
        effects.retain(|e| !matches!(e, Effect::LoadPage | Effect::RenderCurrentPage));
    } else if effects.contains(&Effect::LoadPage) {
        effects.retain(|e| *e != Effect::RenderCurrentPage);
    }
    effects
}

/// Commands that modify display parameters
#[derive(Clone, Debug)]
pub enum Command {
    /// Replace the document source
    SetSource(Option<Source>),
    /// Toggle credentialed requests
    SetCredentials(bool),
    /// Update character map options
    SetCMap {
        url: Option<String>,
        packed: Option<bool>,
    },
    /// Go to a page
    SetPage(usize),
    /// Set the logical scale
    SetScale(f64),
    /// Set the rotation override
    SetRotation(i32),
    /// Set the engine worker location
    SetWorkerSource(Option<String>),
}

/// Pipeline stages to re-run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Forward the worker location to the engine
    ConfigureWorker,
    /// Open the current source
    OpenDocument,
    /// Drop the current document and page
    ReleaseDocument,
    /// Load the current page from the current document
    LoadPage,
    /// Redraw the current page with current scale and rotation
    RenderCurrentPage,
}

impl Effect {
    fn stage(self) -> u8 {
        match self {
            Self::ConfigureWorker => 0,
            Self::OpenDocument | Self::ReleaseDocument => 1,
            Self::LoadPage => 2,
            Self::RenderCurrentPage => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_state() -> WatchState {
        let mut state = WatchState::new();
        let _ = state.update(DisplayParams::with_source(Source::url("doc.pdf")));
        state
    }

    #[test]
    fn first_update_configures_worker_and_opens() {
        let mut state = WatchState::new();
        let effects = state.update(DisplayParams::with_source(Source::url("doc.pdf")));
        assert_eq!(effects, vec![Effect::ConfigureWorker, Effect::OpenDocument]);
    }

    #[test]
    fn first_update_without_source_only_configures_worker() {
        let mut state = WatchState::new();
        let effects = state.update(DisplayParams::default());
        assert_eq!(effects, vec![Effect::ConfigureWorker]);
    }

    #[test]
    fn unchanged_params_produce_no_effects() {
        let mut state = loaded_state();
        let effects = state.update(DisplayParams::with_source(Source::url("doc.pdf")));
        assert!(effects.is_empty());
    }

    #[test]
    fn scale_and_rotation_rerender_without_reload() {
        let mut state = loaded_state();
        assert_eq!(
            state.apply(Command::SetScale(2.0)),
            vec![Effect::RenderCurrentPage]
        );
        assert_eq!(
            state.apply(Command::SetRotation(-90)),
            vec![Effect::RenderCurrentPage]
        );
        assert!(state.apply(Command::SetRotation(-90)).is_empty());
    }

    #[test]
    fn page_change_loads_page() {
        let mut state = loaded_state();
        assert_eq!(state.apply(Command::SetPage(2)), vec![Effect::LoadPage]);
        assert_eq!(state.params().page, 2);
    }

    #[test]
    fn open_options_reopen_only_with_source() {
        let mut state = WatchState::new();
        assert!(state.apply(Command::SetCredentials(true)).is_empty());

        let mut state = loaded_state();
        assert_eq!(
            state.apply(Command::SetCredentials(true)),
            vec![Effect::OpenDocument]
        );
        assert_eq!(
            state.apply(Command::SetCMap {
                url: Some("/cmaps/".into()),
                packed: Some(true),
            }),
            vec![Effect::OpenDocument]
        );
    }

    #[test]
    fn clearing_source_releases_document() {
        let mut state = loaded_state();
        let params = DisplayParams {
            page: 3,
            ..DisplayParams::default()
        };
        assert_eq!(state.update(params), vec![Effect::ReleaseDocument]);
    }

    #[test]
    fn page_load_subsumes_render() {
        let mut state = loaded_state();
        let params = DisplayParams {
            page: 2,
            scale: 3.0,
            ..DisplayParams::with_source(Source::url("doc.pdf"))
        };
        assert_eq!(state.update(params), vec![Effect::LoadPage]);
    }

    #[test]
    fn worker_change_is_independent_of_document() {
        let mut state = loaded_state();
        let params = DisplayParams {
            worker_src: Some("/worker.js".into()),
            ..DisplayParams::with_source(Source::url("doc.pdf"))
        };
        assert_eq!(state.update(params), vec![Effect::ConfigureWorker]);
    }
}
