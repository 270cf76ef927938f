//! View state: everything the user controls about how the dashboard looks.
//!
//! Every operation is a synchronous state change that answers with the
//! narrowest [`RenderRequest`] able to bring the view tree up to date. None of
//! them perform I/O or touch subject status.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, GroupFilter};
use crate::error::{DashError, Result};
use crate::status::ColorScheme;

pub const DEFAULT_SLIDE_HEIGHT: u32 = 256;
pub const MIN_SLIDE_HEIGHT: u32 = 16;
pub const MAX_SLIDE_HEIGHT: u32 = 2048;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Render pass needed after a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderRequest {
    Nothing,
    /// Header only (poll settings, counts).
    Header,
    /// Progress bars and summaries of every row.
    StatusLines,
    /// Tile heights and caption fonts, without regenerating galleries.
    Restyle,
    /// Show or hide the annotation controls.
    Annotations,
    /// Row visibility and selection highlight.
    RowVisibility,
    /// Status line and gallery of one row.
    Row(usize),
    /// Status line and gallery of every row.
    Rows,
}

/// A color scheme given either by preset name or as four explicit glyphs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemeChoice {
    Preset(String),
    Custom(ColorScheme),
}

impl SchemeChoice {
    pub fn resolve(self) -> Result<ColorScheme> {
        match self {
            SchemeChoice::Preset(name) => ColorScheme::preset(&name),
            SchemeChoice::Custom(scheme) => Ok(scheme),
        }
    }
}

/// A user interaction, as posted by the binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    ToggleSingleSubject,
    SelectSubject { subject: usize },
    ToggleExpand { subject: usize },
    ToggleExpandAll,
    SetVisibleColumns { columns: BTreeSet<usize> },
    ShowGroup { filter: GroupFilter },
    SetSlideHeight { height: u32 },
    SetPollInterval { millis: u64 },
    SetColorScheme { scheme: SchemeChoice },
    SetWrapImages { enabled: bool },
    SetLazyLoad { enabled: bool },
    SetShowAnnotations { enabled: bool },
    SetHideUnlaunched { enabled: bool },
    SetShowAllStages { enabled: bool },
    SetHover { enabled: bool },
    TogglePaused,
    SetExclude { subject: usize, exclude: bool },
    SetNote { subject: usize, note: String },
}

#[derive(Debug, Clone)]
pub struct ViewState {
    expanded: Vec<bool>,
    selected: Option<usize>,
    single_subject: bool,
    expand_all: bool,
    visible: BTreeSet<usize>,
    artifact_count: usize,
    slide_height: u32,
    wrap_images: bool,
    lazy_load: bool,
    show_annotations: bool,
    hide_unlaunched: bool,
    show_all_stages: bool,
    hover: bool,
    paused: bool,
    poll_interval: Duration,
    scheme: ColorScheme,
}

impl ViewState {
    pub fn new(subject_count: usize, catalog: &Catalog) -> Self {
        Self {
            expanded: vec![false; subject_count],
            selected: None,
            single_subject: false,
            expand_all: false,
            visible: catalog.default_visible(),
            artifact_count: catalog.artifacts.len(),
            slide_height: DEFAULT_SLIDE_HEIGHT,
            wrap_images: false,
            lazy_load: true,
            show_annotations: false,
            hide_unlaunched: false,
            show_all_stages: false,
            hover: true,
            paused: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            scheme: ColorScheme::default(),
        }
    }

    fn check_subject(&self, subject: usize) -> Result<()> {
        if subject >= self.expanded.len() {
            return Err(DashError::SubjectOutOfRange {
                index: subject,
                len: self.expanded.len(),
            });
        }
        Ok(())
    }

    // ─── Subjects ────────────────────────────────────────────────────────────

    /// Switch between all subjects and the selected one. Does nothing until a
    /// subject is selected.
    pub fn toggle_single_subject(&mut self) -> RenderRequest {
        if self.selected.is_none() {
            return RenderRequest::Nothing;
        }
        self.single_subject = !self.single_subject;
        RenderRequest::RowVisibility
    }

    /// Select a subject, or deselect it when it is already selected.
    pub fn select_subject(&mut self, subject: usize) -> Result<RenderRequest> {
        self.check_subject(subject)?;
        if self.selected == Some(subject) {
            self.selected = None;
            self.single_subject = false;
        } else {
            self.selected = Some(subject);
        }
        Ok(RenderRequest::RowVisibility)
    }

    pub fn toggle_expanded(&mut self, subject: usize) -> Result<RenderRequest> {
        self.check_subject(subject)?;
        self.expanded[subject] = !self.expanded[subject];
        Ok(RenderRequest::Row(subject))
    }

    /// Flip expand-all and force every subject to the new value.
    pub fn toggle_expand_all(&mut self) -> RenderRequest {
        self.expand_all = !self.expand_all;
        self.expanded.fill(self.expand_all);
        RenderRequest::Rows
    }

    // ─── Columns ─────────────────────────────────────────────────────────────

    /// Replace the visible artifact set.
    pub fn set_visible_columns(&mut self, columns: BTreeSet<usize>) -> Result<RenderRequest> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.artifact_count) {
            return Err(DashError::ArtifactOutOfRange {
                index: bad,
                len: self.artifact_count,
            });
        }
        self.visible = columns;
        Ok(RenderRequest::Rows)
    }

    /// Show exactly the artifacts of one group, or all of them.
    pub fn show_group(&mut self, filter: GroupFilter, catalog: &Catalog) -> Result<RenderRequest> {
        let columns = catalog.select(filter)?;
        self.set_visible_columns(columns)
    }

    // ─── Presentation ────────────────────────────────────────────────────────

    pub fn set_slide_height(&mut self, height: u32) -> RenderRequest {
        let height = height.clamp(MIN_SLIDE_HEIGHT, MAX_SLIDE_HEIGHT);
        if height == self.slide_height {
            return RenderRequest::Nothing;
        }
        self.slide_height = height;
        RenderRequest::Restyle
    }

    pub fn set_scheme(&mut self, scheme: ColorScheme) -> RenderRequest {
        self.scheme = scheme;
        RenderRequest::StatusLines
    }

    pub fn set_wrap_images(&mut self, enabled: bool) -> RenderRequest {
        self.wrap_images = enabled;
        RenderRequest::Rows
    }

    pub fn set_lazy_load(&mut self, enabled: bool) -> RenderRequest {
        self.lazy_load = enabled;
        RenderRequest::Rows
    }

    pub fn set_show_annotations(&mut self, enabled: bool) -> RenderRequest {
        self.show_annotations = enabled;
        RenderRequest::Annotations
    }

    pub fn set_hide_unlaunched(&mut self, enabled: bool) -> RenderRequest {
        self.hide_unlaunched = enabled;
        RenderRequest::RowVisibility
    }

    pub fn set_show_all_stages(&mut self, enabled: bool) -> RenderRequest {
        self.show_all_stages = enabled;
        RenderRequest::StatusLines
    }

    pub fn set_hover(&mut self, enabled: bool) -> RenderRequest {
        self.hover = enabled;
        RenderRequest::StatusLines
    }

    // ─── Polling ─────────────────────────────────────────────────────────────

    pub fn set_poll_interval(&mut self, interval: Duration) -> Result<RenderRequest> {
        if interval.is_zero() {
            return Err(DashError::Other("poll interval must be positive".into()));
        }
        self.poll_interval = interval;
        Ok(RenderRequest::Header)
    }

    pub fn set_paused(&mut self, paused: bool) -> RenderRequest {
        self.paused = paused;
        RenderRequest::Header
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn is_expanded(&self, subject: usize) -> bool {
        self.expanded.get(subject).copied().unwrap_or(false)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn single_subject(&self) -> bool {
        self.single_subject
    }

    pub fn expand_all(&self) -> bool {
        self.expand_all
    }

    pub fn visible_columns(&self) -> &BTreeSet<usize> {
        &self.visible
    }

    pub fn is_visible(&self, artifact: usize) -> bool {
        self.visible.contains(&artifact)
    }

    pub fn slide_height(&self) -> u32 {
        self.slide_height
    }

    pub fn wrap_images(&self) -> bool {
        self.wrap_images
    }

    pub fn lazy_load(&self) -> bool {
        self.lazy_load
    }

    pub fn show_annotations(&self) -> bool {
        self.show_annotations
    }

    pub fn hide_unlaunched(&self) -> bool {
        self.hide_unlaunched
    }

    pub fn show_all_stages(&self) -> bool {
        self.show_all_stages
    }

    pub fn hover(&self) -> bool {
        self.hover
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn scheme(&self) -> &ColorScheme {
        &self.scheme
    }
}
