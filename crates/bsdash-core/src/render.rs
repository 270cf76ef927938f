//! Renderer: turns subjects, statuses, the catalog and the view state into a
//! view-model tree.
//!
//! The tree carries no markup and no handlers. Interactive nodes name the
//! [`Action`] they trigger; a separate binding layer attaches the handlers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::annotations::{Annotation, AnnotationSheet};
use crate::catalog::{Catalog, OutputArtifact};
use crate::stats::{RunInfo, StatusCounts};
use crate::status::{
    progress_glyphs, Classification, ColorScheme, Glyph, StageCode, SubjectStatus,
    SummaryFragment, Tone,
};
use crate::view::{Action, ViewState};

pub const NO_STAGES_SELECTED: &str = "no stages selected.";
pub const NOT_APPLICABLE: &str = "None of the selected outputs were specified for this subject.";

/// Font size of placeholder text, in points.
pub fn text_font_pt(slide_height: u32) -> f32 {
    slide_height as f32 / 20.0
}

/// Font size of tile captions, in points.
pub fn caption_font_pt(slide_height: u32) -> f32 {
    slide_height as f32 / 22.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub header: HeaderView,
    pub rows: Vec<SubjectRow>,
}

/// Health of the status poller as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollHealth {
    /// Sequence number of the last applied status document.
    pub last_applied: u64,
    /// Failed polls since the last success.
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl PollHealth {
    pub fn is_stale(&self) -> bool {
        self.consecutive_failures > 0
    }
}

/// Header numbers that change with every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub run_parameters: String,
    pub counts: StatusCounts,
    pub run_info: RunInfo,
    pub poll: PollHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderView {
    #[serde(flatten)]
    pub progress: DashboardStats,
    pub paused: bool,
    pub poll_interval_ms: u64,
    pub expand_all: bool,
    pub single_subject: bool,
    pub show_annotations: bool,
    pub wrap_images: bool,
    pub lazy_load: bool,
    pub hide_unlaunched: bool,
    pub show_all_stages: bool,
    pub hover: bool,
    pub visible_columns: BTreeSet<usize>,
    pub style: Style,
    pub scheme: ColorScheme,
}

/// Size-derived styling shared by every tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub slide_height: u32,
    pub text_font_pt: f32,
    pub caption_font_pt: f32,
}

impl Style {
    pub fn for_height(slide_height: u32) -> Self {
        Self {
            slide_height,
            text_font_pt: text_font_pt(slide_height),
            caption_font_pt: caption_font_pt(slide_height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRow {
    pub index: usize,
    pub subject: String,
    pub visible: bool,
    pub selected: bool,
    pub wrap: bool,
    pub status: StatusLine,
    pub gallery: Gallery,
    pub annotation: AnnotationControls,
    /// Fired by clicking the status line.
    pub on_select: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub expanded: bool,
    pub glyphs: Vec<Glyph>,
    pub hover: bool,
    /// Set when the status string could not be interpreted.
    pub malformed: Option<String>,
    pub summary: Vec<SummaryFragment>,
    /// Fired by the expand/collapse control.
    pub on_toggle: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tiles")]
pub enum Gallery {
    /// Collapsed, or nothing to show for this subject yet.
    Empty,
    NoStagesSelected,
    NotApplicable,
    Tiles(Vec<Tile>),
}

impl Gallery {
    pub fn tiles(&self) -> &[Tile] {
        match self {
            Gallery::Tiles(tiles) => tiles,
            _ => &[],
        }
    }

    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Gallery::NoStagesSelected => Some(NO_STAGES_SELECTED),
            Gallery::NotApplicable => Some(NOT_APPLICABLE),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub artifact: usize,
    pub caption: String,
    pub tone: Tone,
    pub content: TileContent,
    pub style: Style,
    pub width: Option<u32>,
    /// Overrides the slide height when set.
    pub height: Option<u32>,
    pub surface: bool,
    pub lazy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TileContent {
    Image { src: String },
    Placeholder { text: String, running: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationControls {
    pub visible: bool,
    pub exclude: bool,
    pub note: String,
}

/// Replacement status line and gallery for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPatch {
    pub index: usize,
    pub wrap: bool,
    pub status: StatusLine,
    pub gallery: Gallery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatch {
    pub index: usize,
    pub status: StatusLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPatch {
    pub index: usize,
    pub visible: bool,
    pub selected: bool,
}

/// Change published to every connected view after a render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "data")]
pub enum ViewUpdate {
    /// Run info, counts and poller health; sent after every poll.
    Progress(DashboardStats),
    /// The whole header including the controls; sent only when view state changes.
    Header(HeaderView),
    StatusLines(Vec<StatusPatch>),
    Rows(Vec<RowPatch>),
    Visibility(Vec<VisibilityPatch>),
    Restyle(Style),
    Annotations { visible: bool },
    Rebuild(DashboardView),
}

impl ViewUpdate {
    /// Event name used on the live stream.
    pub fn name(&self) -> &'static str {
        match self {
            ViewUpdate::Progress(_) => "progress",
            ViewUpdate::Header(_) => "header",
            ViewUpdate::StatusLines(_) => "status_lines",
            ViewUpdate::Rows(_) => "rows",
            ViewUpdate::Visibility(_) => "visibility",
            ViewUpdate::Restyle(_) => "restyle",
            ViewUpdate::Annotations { .. } => "annotations",
            ViewUpdate::Rebuild(_) => "rebuild",
        }
    }
}

/// The effective catalog plus the current column selection, used to build
/// column and group menus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogView {
    pub stage_names: Vec<String>,
    pub groups: Vec<GroupEntry>,
    pub artifacts: Vec<OutputArtifact>,
    pub visible: BTreeSet<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub group: usize,
    pub name: String,
    pub artifacts: Vec<usize>,
}

impl CatalogView {
    pub fn new(catalog: &Catalog, view: &ViewState) -> Self {
        let groups = catalog
            .groups()
            .into_iter()
            .map(|group| GroupEntry {
                group,
                name: catalog.group_name(group),
                artifacts: catalog
                    .artifacts
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.group == group)
                    .map(|(i, _)| i)
                    .collect(),
            })
            .collect();
        Self {
            stage_names: catalog.stage_names.clone(),
            groups,
            artifacts: catalog.artifacts.clone(),
            visible: view.visible_columns().clone(),
        }
    }
}

/// Everything a render pass reads. Borrowed, never mutated.
pub struct RenderContext<'a> {
    pub subjects: &'a [String],
    pub statuses: &'a [SubjectStatus],
    pub catalog: &'a Catalog,
    pub view: &'a ViewState,
    pub annotations: &'a AnnotationSheet,
    /// URL prefix of the output images, `<base>/<subject>/<file>`.
    pub image_base: &'a str,
}

impl RenderContext<'_> {
    fn status(&self, index: usize) -> &SubjectStatus {
        static UNAVAILABLE: SubjectStatus = SubjectStatus::Unavailable;
        self.statuses.get(index).unwrap_or(&UNAVAILABLE)
    }

    /// Full rebuild: one container per subject.
    pub fn build_rows(&self) -> Vec<SubjectRow> {
        (0..self.subjects.len()).map(|i| self.row(i)).collect()
    }

    pub fn row(&self, index: usize) -> SubjectRow {
        SubjectRow {
            index,
            subject: self.subjects.get(index).cloned().unwrap_or_default(),
            visible: self.row_visible(index),
            selected: self.view.selected() == Some(index),
            wrap: self.view.wrap_images(),
            status: self.status_line(index),
            gallery: self.gallery(index),
            annotation: self.annotation(index),
            on_select: Action::SelectSubject { subject: index },
        }
    }

    pub fn row_patch(&self, index: usize) -> RowPatch {
        RowPatch {
            index,
            wrap: self.view.wrap_images(),
            status: self.status_line(index),
            gallery: self.gallery(index),
        }
    }

    pub fn visibility(&self, index: usize) -> VisibilityPatch {
        VisibilityPatch {
            index,
            visible: self.row_visible(index),
            selected: self.view.selected() == Some(index),
        }
    }

    /// Single-subject view hides every other row; hide-unlaunched hides rows
    /// whose launch is still pending.
    pub fn row_visible(&self, index: usize) -> bool {
        if self.view.single_subject() && self.view.selected() != Some(index) {
            return false;
        }
        if self.view.hide_unlaunched() && self.status(index).classify().is_pending() {
            return false;
        }
        true
    }

    pub fn status_line(&self, index: usize) -> StatusLine {
        let status = self.status(index);
        let classification = status.classify();
        let glyphs = status
            .codes()
            .map(|codes| {
                progress_glyphs(
                    codes,
                    self.catalog,
                    self.view.scheme(),
                    self.view.show_all_stages(),
                )
            })
            .unwrap_or_default();
        let malformed = match &classification {
            Classification::Malformed { reason } => Some(reason.clone()),
            _ => None,
        };
        StatusLine {
            expanded: self.view.is_expanded(index),
            glyphs,
            hover: self.view.hover(),
            malformed,
            summary: classification.summary(self.catalog),
            on_toggle: Action::ToggleExpand { subject: index },
        }
    }

    /// Gallery of one subject. Collapsed rows render empty.
    pub fn gallery(&self, index: usize) -> Gallery {
        if !self.view.is_expanded(index) {
            return Gallery::Empty;
        }
        let status = self.status(index);
        let codes = match status.codes() {
            Some(codes) if status.classify().has_stage_detail() => codes,
            _ => return Gallery::Empty,
        };
        if self.view.visible_columns().is_empty() {
            return Gallery::NoStagesSelected;
        }

        let subject = self.subjects.get(index).map(String::as_str).unwrap_or("");
        let style = Style::for_height(self.view.slide_height());
        let tiles: Vec<Tile> = self
            .catalog
            .artifacts
            .iter()
            .enumerate()
            .filter(|(i, _)| self.view.is_visible(*i))
            .filter_map(|(i, artifact)| {
                let stage = artifact.stage_index();
                let code = codes.get(stage)?;
                let stage_name = self.catalog.stage_name(stage);
                let (tone, content) = match code {
                    StageCode::NotRun => return None,
                    StageCode::Completed => (
                        Tone::Success,
                        TileContent::Image {
                            src: image_path(self.image_base, subject, &artifact.image),
                        },
                    ),
                    StageCode::Launched => (
                        Tone::Primary,
                        TileContent::Placeholder {
                            text: format!("running {}...", stage_name),
                            running: true,
                        },
                    ),
                    StageCode::Queued => (
                        Tone::Dark,
                        TileContent::Placeholder {
                            text: format!("{} is queued", stage_name),
                            running: false,
                        },
                    ),
                    StageCode::Error => (
                        Tone::Danger,
                        TileContent::Placeholder {
                            text: format!("error in: {}", stage_name),
                            running: false,
                        },
                    ),
                    StageCode::Pending => (
                        Tone::Muted,
                        TileContent::Placeholder {
                            text: format!("{} is pending", stage_name),
                            running: false,
                        },
                    ),
                };
                Some(Tile {
                    artifact: i,
                    caption: artifact.description.clone(),
                    tone,
                    content,
                    style,
                    width: artifact.fixed_width(),
                    height: artifact.fixed_height(),
                    surface: artifact.surface,
                    lazy: self.view.lazy_load(),
                })
            })
            .collect();

        if tiles.is_empty() {
            Gallery::NotApplicable
        } else {
            Gallery::Tiles(tiles)
        }
    }

    pub fn annotation(&self, index: usize) -> AnnotationControls {
        let Annotation { exclude, note } = self.annotations.get(index).cloned().unwrap_or_default();
        AnnotationControls {
            visible: self.view.show_annotations(),
            exclude,
            note,
        }
    }
}

/// `<base>/<subject>/<file>`; existence is inferred from the stage code only.
pub fn image_path(base: &str, subject: &str, file: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("{}/{}", subject, file)
    } else {
        format!("{}/{}/{}", base, subject, file)
    }
}
