//! The dashboard controller: one state object owning subjects, statuses, the
//! catalog, view state and annotations.
//!
//! `Dashboard` is synchronous and single-owner. The engine drives it from one
//! task; the CLI drives it directly.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::annotations::AnnotationSheet;
use crate::catalog::Catalog;
use crate::documents::{self, RunParameters, StatusDocument};
use crate::error::Result;
use crate::poller::{PollSequencer, PollVerdict};
use crate::render::{
    CatalogView, DashboardStats, DashboardView, HeaderView, PollHealth, RenderContext, RowPatch, StatusPatch,
    Style, ViewUpdate,
};
use crate::stats::{RunInfo, StatusCounts};
use crate::status::SubjectStatus;
use crate::view::{Action, RenderRequest, ViewState, DEFAULT_POLL_INTERVAL};

/// Configuration for a dashboard session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the subject list, status document and output images.
    pub qc_dir: PathBuf,
    pub poll_interval: Duration,
    /// URL prefix under which output images are served.
    pub image_base: String,
    pub start_paused: bool,
    /// Buffered view updates per subscriber before it lags.
    pub update_capacity: usize,
}

impl EngineConfig {
    pub fn new(qc_dir: impl Into<PathBuf>) -> Self {
        Self {
            qc_dir: qc_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            image_base: "/qc".to_string(),
            start_paused: false,
            update_capacity: 256,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_image_base(mut self, base: impl Into<String>) -> Self {
        self.image_base = base.into();
        self
    }

    pub fn with_start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    pub fn with_update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity.max(1);
        self
    }
}


pub struct Dashboard {
    subjects: Vec<String>,
    catalog: Catalog,
    statuses: Vec<SubjectStatus>,
    view: ViewState,
    annotations: AnnotationSheet,
    run_parameters: Option<RunParameters>,
    run_info: RunInfo,
    counts: StatusCounts,
    sequencer: PollSequencer,
    image_base: String,
}

impl Dashboard {
    /// A dashboard with every subject's status unavailable.
    pub fn new(
        subjects: Vec<String>,
        catalog: Catalog,
        run_parameters: Option<RunParameters>,
        image_base: impl Into<String>,
    ) -> Self {
        let n = subjects.len();
        Self {
            statuses: vec![SubjectStatus::Unavailable; n],
            view: ViewState::new(n, &catalog),
            annotations: AnnotationSheet::new(n),
            counts: StatusCounts {
                total: n,
                ..Default::default()
            },
            subjects,
            catalog,
            run_parameters,
            run_info: RunInfo::default(),
            sequencer: PollSequencer::new(),
            image_base: image_base.into(),
        }
    }

    /// Read the startup documents of a QC directory. Only a missing or
    /// unreadable subject list is an error.
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let subjects = documents::load_subject_list(&config.qc_dir)?.subjects;
        let catalog = Catalog::resolve(documents::load_dashboard_config(&config.qc_dir));
        let run_parameters = documents::load_run_parameters(&config.qc_dir);

        let mut dashboard = Self::new(subjects, catalog, run_parameters, &config.image_base);
        dashboard.configure_polling(config)?;

        info!(
            qc_dir = %config.qc_dir.display(),
            subjects = dashboard.subjects.len(),
            stages = dashboard.catalog.stage_count(),
            "Dashboard loaded"
        );
        Ok(dashboard)
    }

    fn ctx(&self) -> RenderContext<'_> {
        RenderContext {
            subjects: &self.subjects,
            statuses: &self.statuses,
            catalog: &self.catalog,
            view: &self.view,
            annotations: &self.annotations,
            image_base: &self.image_base,
        }
    }

    // ─── Polling ─────────────────────────────────────────────────────────────

    /// Take the poll interval and paused flag from an engine config.
    pub fn configure_polling(&mut self, config: &EngineConfig) -> Result<()> {
        self.view.set_poll_interval(config.poll_interval)?;
        self.view.set_paused(config.start_paused);
        Ok(())
    }

    /// Sequence number for the next status fetch.
    pub fn next_poll_seq(&mut self) -> u64 {
        self.sequencer.next_seq()
    }

    /// Apply a finished fetch. Stale results change nothing; failures keep
    /// the previous statuses and only refresh the progress numbers. Polls
    /// never re-render the controls.
    pub fn apply_poll(&mut self, seq: u64, result: Result<StatusDocument>) -> Vec<ViewUpdate> {
        if self.sequencer.accept(seq, &result) == PollVerdict::Stale {
            return vec![];
        }
        match result {
            Ok(doc) => {
                self.apply_status(&doc);
                vec![
                    ViewUpdate::Progress(self.stats()),
                    ViewUpdate::Rows(self.all_row_patches()),
                ]
            }
            Err(_) => vec![ViewUpdate::Progress(self.stats())],
        }
    }

    fn apply_status(&mut self, doc: &StatusDocument) {
        let n = self.subjects.len();
        if doc.process_states.len() > n {
            warn!(
                reported = doc.process_states.len(),
                subjects = n,
                "Status document has more entries than subjects; extra entries ignored"
            );
        }
        let stage_count = self.catalog.stage_count();
        self.statuses = (0..n)
            .map(|i| {
                let raw = doc.process_states.get(i).and_then(|s| s.as_deref());
                SubjectStatus::interpret(raw, stage_count)
            })
            .collect();
        self.counts = StatusCounts::tally(&self.statuses, n);
        self.run_info = RunInfo::from_document(doc);
        debug!(summary = %self.counts.summary_line(), "Applied status document");
    }

    // ─── Actions ─────────────────────────────────────────────────────────────

    /// Apply one user action and render what it invalidated. Invalid actions
    /// leave the state untouched.
    pub fn handle(&mut self, action: Action) -> Result<Vec<ViewUpdate>> {
        let request = match action {
            Action::ToggleSingleSubject => self.view.toggle_single_subject(),
            Action::SelectSubject { subject } => self.view.select_subject(subject)?,
            Action::ToggleExpand { subject } => self.view.toggle_expanded(subject)?,
            Action::ToggleExpandAll => self.view.toggle_expand_all(),
            Action::SetVisibleColumns { columns } => self.view.set_visible_columns(columns)?,
            Action::ShowGroup { filter } => self.view.show_group(filter, &self.catalog)?,
            Action::SetSlideHeight { height } => self.view.set_slide_height(height),
            Action::SetPollInterval { millis } => {
                self.view.set_poll_interval(Duration::from_millis(millis))?
            }
            Action::SetColorScheme { scheme } => self.view.set_scheme(scheme.resolve()?),
            Action::SetWrapImages { enabled } => self.view.set_wrap_images(enabled),
            Action::SetLazyLoad { enabled } => self.view.set_lazy_load(enabled),
            Action::SetShowAnnotations { enabled } => self.view.set_show_annotations(enabled),
            Action::SetHideUnlaunched { enabled } => self.view.set_hide_unlaunched(enabled),
            Action::SetShowAllStages { enabled } => self.view.set_show_all_stages(enabled),
            Action::SetHover { enabled } => self.view.set_hover(enabled),
            Action::TogglePaused => {
                let paused = !self.view.paused();
                self.view.set_paused(paused)
            }
            // The editing client already shows the new value.
            Action::SetExclude { subject, exclude } => {
                self.annotations.set_exclude(subject, exclude)?;
                RenderRequest::Nothing
            }
            Action::SetNote { subject, note } => {
                self.annotations.set_note(subject, note)?;
                RenderRequest::Nothing
            }
        };
        Ok(self.render(request))
    }

    /// Produce the updates for a render request. Every pass except a single
    /// row also refreshes the header, which mirrors the view toggles.
    pub fn render(&self, request: RenderRequest) -> Vec<ViewUpdate> {
        let ctx = self.ctx();
        let update = match request {
            RenderRequest::Nothing => return vec![],
            RenderRequest::Header => return vec![ViewUpdate::Header(self.header())],
            RenderRequest::Row(index) => return vec![ViewUpdate::Rows(vec![ctx.row_patch(index)])],
            RenderRequest::StatusLines => ViewUpdate::StatusLines(
                (0..self.subjects.len())
                    .map(|index| StatusPatch {
                        index,
                        status: ctx.status_line(index),
                    })
                    .collect(),
            ),
            RenderRequest::Restyle => {
                ViewUpdate::Restyle(Style::for_height(self.view.slide_height()))
            }
            RenderRequest::Annotations => ViewUpdate::Annotations {
                visible: self.view.show_annotations(),
            },
            RenderRequest::RowVisibility => ViewUpdate::Visibility(
                (0..self.subjects.len()).map(|i| ctx.visibility(i)).collect(),
            ),
            RenderRequest::Rows => ViewUpdate::Rows(self.all_row_patches()),
        };
        vec![ViewUpdate::Header(self.header()), update]
    }

    fn all_row_patches(&self) -> Vec<RowPatch> {
        let ctx = self.ctx();
        (0..self.subjects.len()).map(|i| ctx.row_patch(i)).collect()
    }

    // ─── Views ───────────────────────────────────────────────────────────────

    /// Full rebuild of the view tree.
    pub fn view(&self) -> DashboardView {
        DashboardView {
            header: self.header(),
            rows: self.ctx().build_rows(),
        }
    }

    pub fn header(&self) -> HeaderView {
        HeaderView {
            progress: self.stats(),
            paused: self.view.paused(),
            poll_interval_ms: self.view.poll_interval().as_millis() as u64,
            expand_all: self.view.expand_all(),
            single_subject: self.view.single_subject(),
            show_annotations: self.view.show_annotations(),
            wrap_images: self.view.wrap_images(),
            lazy_load: self.view.lazy_load(),
            hide_unlaunched: self.view.hide_unlaunched(),
            show_all_stages: self.view.show_all_stages(),
            hover: self.view.hover(),
            visible_columns: self.view.visible_columns().clone(),
            style: Style::for_height(self.view.slide_height()),
            scheme: self.view.scheme().clone(),
        }
    }

    pub fn stats(&self) -> DashboardStats {
        DashboardStats {
            run_parameters: RunParameters::describe(self.run_parameters.as_ref()),
            counts: self.counts,
            run_info: self.run_info.clone(),
            poll: self.sequencer.health().clone(),
        }
    }

    pub fn catalog_view(&self) -> CatalogView {
        CatalogView::new(&self.catalog, &self.view)
    }

    /// TSV text of the exclusion list.
    pub fn export_annotations(&self) -> String {
        self.annotations.export_tsv(&self.subjects)
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn statuses(&self) -> &[SubjectStatus] {
        &self.statuses
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    pub fn run_info(&self) -> &RunInfo {
        &self.run_info
    }

    pub fn run_parameters(&self) -> Option<&RunParameters> {
        self.run_parameters.as_ref()
    }

    pub fn poll_health(&self) -> &PollHealth {
        self.sequencer.health()
    }
}
