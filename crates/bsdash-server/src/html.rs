//! HTML rendering of the view tree.
//!
//! Interactive elements carry their action as JSON in a `data-action`
//! attribute. Inputs additionally name the field their value fills
//! (`data-field`) and how to read it (`data-kind`); `dashboard.js` delegates
//! every event by those attributes.

use serde::Serialize;

use bsdash_core::catalog::GroupFilter;
use bsdash_core::render::{
    AnnotationControls, CatalogView, DashboardStats, DashboardView, Gallery, HeaderView, RowPatch,
    StatusLine,
    Style, SubjectRow, Tile, TileContent, ViewUpdate, VisibilityPatch,
};
use bsdash_core::stats::RunInfo;
use bsdash_core::status::ColorScheme;
use bsdash_core::Action;

/// Escape text for element content and quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// ` data-action="..."` for an action.
fn action_attr(action: &Action) -> String {
    let json = serde_json::to_string(action).unwrap_or_default();
    format!(" data-action=\"{}\"", escape(&json))
}

/// An input whose value fills `field` of `action` when it changes.
fn input_attrs(action: &Action, field: &str, kind: &str) -> String {
    format!(
        "{} data-field=\"{}\" data-kind=\"{}\"",
        action_attr(action),
        field,
        kind
    )
}

fn hidden(visible: bool) -> &'static str {
    if visible {
        ""
    } else {
        " hidden"
    }
}

fn checked(on: bool) -> &'static str {
    if on {
        " checked"
    } else {
        ""
    }
}

/// CSS custom properties that size every tile.
pub fn style_vars(style: &Style) -> String {
    format!(
        "--slide-height: {}px; --text-font: {}pt; --caption-font: {}pt;",
        style.slide_height, style.text_font_pt, style.caption_font_pt
    )
}

// ─── Page ────────────────────────────────────────────────────────────────────

/// The whole dashboard: header, controls and one container per subject.
pub fn render_dashboard(view: &DashboardView, catalog: &CatalogView) -> String {
    let mut out = format!(
        "<div id=\"dashboard\" style=\"{}\">",
        style_vars(&view.header.style)
    );
    out.push_str(&format!(
        "<header id=\"dashboard-header\">\
         <div id=\"dashboard-progress\">{}</div>\
         <div id=\"dashboard-controls\">{}</div></header>",
        render_progress(&view.header.progress),
        render_header(&view.header, catalog)
    ));
    out.push_str("<main id=\"subjects\">");
    for row in &view.rows {
        out.push_str(&render_row(row));
    }
    out.push_str("</main></div>");
    out
}

// ─── Header ──────────────────────────────────────────────────────────────────

/// Run parameters, run info, counts and the stale badge. Replaced on every poll.
pub fn render_progress(progress: &DashboardStats) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<div class=\"run-parameters\">{}</div>",
        escape(&progress.run_parameters)
    ));
    out.push_str(&render_run_info(&progress.run_info));

    let c = &progress.counts;
    out.push_str(&format!(
        "<div class=\"counts\">{} of {} subjects reported. \
         <span class=\"text-success\">finished: {}</span> \
         <span class=\"text-primary\">running: {}</span> \
         <span class=\"text-danger\">error: {}</span> \
         <span class=\"text-dark\">queued: {}</span> \
         <span class=\"text-muted\">pending: {}</span></div>",
        c.reported, c.total, c.finished, c.running, c.error, c.queued, c.pending
    ));

    if progress.poll.is_stale() {
        out.push_str(&format!(
            "<div class=\"badge badge-warning poll-stale\">status stale: {} failed poll(s){}</div>",
            progress.poll.consecutive_failures,
            progress
                .poll
                .last_error
                .as_deref()
                .map(|e| format!(" ({})", escape(e)))
                .unwrap_or_default()
        ));
    }
    out
}

/// Buttons, inputs and column menus. Only view-state changes replace these,
/// so a half-typed input survives polling.
pub fn render_header(header: &HeaderView, catalog: &CatalogView) -> String {
    let mut out = render_controls(header);
    out.push_str(&render_columns(header, catalog));
    out
}

fn render_run_info(info: &RunInfo) -> String {
    let mut parts = vec![];
    if let Some(start) = &info.start_time {
        parts.push(format!("started {}", escape(start)));
    }
    if let Some(update) = &info.update_time {
        parts.push(format!("updated {}", escape(update)));
    }
    if let Some(runtime) = &info.runtime {
        parts.push(format!("runtime {}", escape(runtime)));
    }
    if let Some(status) = &info.producer_status {
        parts.push(escape(status));
    }
    parts.push(info.state_text().to_string());
    format!("<div class=\"run-info\">{}</div>", parts.join(" · "))
}

fn button(label: &str, action: &Action, active: bool) -> String {
    format!(
        "<button type=\"button\" class=\"btn{}\"{}>{}</button>",
        if active { " active" } else { "" },
        action_attr(action),
        escape(label)
    )
}

fn toggle(label: &str, on: bool, action: Action) -> String {
    format!(
        "<label class=\"toggle\"><input type=\"checkbox\"{}{}> {}</label>",
        input_attrs(&action, "enabled", "checked"),
        checked(on),
        escape(label)
    )
}

fn render_controls(header: &HeaderView) -> String {
    let mut out = String::from("<div class=\"controls\">");
    out.push_str(&button(
        if header.expand_all { "collapse all" } else { "expand all" },
        &Action::ToggleExpandAll,
        header.expand_all,
    ));
    out.push_str(&button(
        "single subject",
        &Action::ToggleSingleSubject,
        header.single_subject,
    ));
    out.push_str(&button(
        if header.paused { "resume" } else { "pause" },
        &Action::TogglePaused,
        header.paused,
    ));

    out.push_str(&format!(
        "<label>poll (ms) <input type=\"number\" min=\"100\" step=\"100\" value=\"{}\"{}></label>",
        header.poll_interval_ms,
        input_attrs(&Action::SetPollInterval { millis: 0 }, "millis", "number")
    ));
    out.push_str(&format!(
        "<label>slide height <input type=\"range\" min=\"64\" max=\"1024\" step=\"16\" value=\"{}\"{}></label>",
        header.style.slide_height,
        input_attrs(&Action::SetSlideHeight { height: 0 }, "height", "number")
    ));

    let scheme_action = Action::SetColorScheme {
        scheme: bsdash_core::view::SchemeChoice::Preset(String::new()),
    };
    out.push_str(&format!(
        "<select class=\"scheme\"{}>",
        input_attrs(&scheme_action, "scheme", "value")
    ));
    let mut matched = false;
    for name in ColorScheme::preset_names() {
        let preset = ColorScheme::preset(name).ok();
        let selected = preset.as_ref() == Some(&header.scheme);
        matched |= selected;
        let glyphs = preset
            .map(|p| format!("{}{}{}{}", p.completed, p.running, p.queued, p.error))
            .unwrap_or_default();
        out.push_str(&format!(
            "<option value=\"{}\"{}>{} {}</option>",
            name,
            if selected { " selected" } else { "" },
            glyphs,
            name
        ));
    }
    if !matched {
        let s = &header.scheme;
        out.push_str(&format!(
            "<option value=\"\" selected disabled>{}{}{}{} custom</option>",
            escape(&s.completed),
            escape(&s.running),
            escape(&s.queued),
            escape(&s.error)
        ));
    }
    out.push_str("</select>");

    out.push_str(&toggle("wrap images", header.wrap_images, Action::SetWrapImages { enabled: false }));
    out.push_str(&toggle("lazy load", header.lazy_load, Action::SetLazyLoad { enabled: false }));
    out.push_str(&toggle(
        "annotations",
        header.show_annotations,
        Action::SetShowAnnotations { enabled: false },
    ));
    out.push_str(&toggle(
        "hide unlaunched",
        header.hide_unlaunched,
        Action::SetHideUnlaunched { enabled: false },
    ));
    out.push_str(&toggle(
        "show all stages",
        header.show_all_stages,
        Action::SetShowAllStages { enabled: false },
    ));
    out.push_str(&toggle("tooltips", header.hover, Action::SetHover { enabled: false }));

    out.push_str("<a class=\"btn\" href=\"/api/annotations/export\" download>export QC list</a>");
    out.push_str("</div>");
    out
}

/// Group shortcuts and one checkbox per output artifact.
fn render_columns(header: &HeaderView, catalog: &CatalogView) -> String {
    let mut out = String::from("<div class=\"columns\"><div class=\"groups\">");
    out.push_str(&button(
        "all",
        &Action::ShowGroup {
            filter: GroupFilter::All,
        },
        false,
    ));
    for group in &catalog.groups {
        out.push_str(&button(
            &group.name,
            &Action::ShowGroup {
                filter: GroupFilter::Group(group.group),
            },
            false,
        ));
    }
    out.push_str("</div>");

    let collect = Action::SetVisibleColumns {
        columns: Default::default(),
    };
    for group in &catalog.groups {
        out.push_str(&format!(
            "<fieldset class=\"column-group\"><legend>{}</legend>",
            escape(&group.name)
        ));
        for &index in &group.artifacts {
            let Some(artifact) = catalog.artifacts.get(index) else {
                continue;
            };
            out.push_str(&format!(
                "<label class=\"column\"><input type=\"checkbox\" data-column=\"{}\"{}{}> {}</label>",
                index,
                input_attrs(&collect, "columns", "collect"),
                checked(header.visible_columns.contains(&index)),
                escape(&artifact.description)
            ));
        }
        out.push_str("</fieldset>");
    }
    out.push_str("</div>");
    out
}

// ─── Rows ────────────────────────────────────────────────────────────────────

pub fn render_row(row: &SubjectRow) -> String {
    format!(
        "<section class=\"subject-row{}\" id=\"row-{i}\" data-index=\"{i}\"{}>\
         <div class=\"row-head\"><span class=\"subject-name\"{}>{}</span>\
         <div class=\"status-line\" id=\"status-{i}\">{}</div></div>\
         <div class=\"gallery{}\" id=\"gallery-{i}\">{}</div>\
         {}</section>",
        if row.selected { " selected" } else { "" },
        hidden(row.visible),
        action_attr(&row.on_select),
        escape(&row.subject),
        render_status(&row.status),
        if row.wrap { " wrap" } else { "" },
        render_gallery(&row.gallery),
        render_annotation(row.index, &row.annotation),
        i = row.index,
    )
}

pub fn render_status(status: &StatusLine) -> String {
    let mut out = format!(
        "<button type=\"button\" class=\"expand-toggle\"{}>{}</button>",
        action_attr(&status.on_toggle),
        if status.expanded { "▾" } else { "▸" }
    );

    out.push_str("<span class=\"progress\">");
    for glyph in &status.glyphs {
        if status.hover {
            out.push_str(&format!(
                "<span class=\"glyph\" title=\"{}\">{}</span>",
                escape(&glyph.tooltip),
                escape(&glyph.symbol)
            ));
        } else {
            out.push_str(&format!("<span class=\"glyph\">{}</span>", escape(&glyph.symbol)));
        }
    }
    out.push_str("</span>");

    if let Some(reason) = &status.malformed {
        out.push_str(&format!(
            "<span class=\"badge badge-warning\" title=\"{}\">malformed</span>",
            escape(reason)
        ));
    }
    for fragment in &status.summary {
        out.push_str(&format!(
            " <span class=\"{}\">{}</span>",
            fragment.tone.css_class(),
            escape(&fragment.text)
        ));
    }
    out
}

pub fn render_gallery(gallery: &Gallery) -> String {
    match gallery {
        Gallery::Empty => String::new(),
        Gallery::NoStagesSelected | Gallery::NotApplicable => format!(
            "<div class=\"notice text-muted\">{}</div>",
            escape(gallery.notice().unwrap_or_default())
        ),
        Gallery::Tiles(tiles) => tiles.iter().map(render_tile).collect(),
    }
}

fn tile_size(tile: &Tile) -> String {
    let mut style = match tile.height {
        Some(h) => format!("height: {}px;", h),
        None => "height: var(--slide-height);".to_string(),
    };
    if let Some(w) = tile.width {
        style.push_str(&format!(" width: {}px;", w));
    }
    style
}

pub fn render_tile(tile: &Tile) -> String {
    let caption = format!(
        "<figcaption class=\"{}\">{}</figcaption>",
        tile.tone.css_class(),
        escape(&tile.caption)
    );
    let kind = if tile.surface { " surface" } else { "" };
    match &tile.content {
        TileContent::Image { src } => format!(
            "<figure class=\"tile{}\" data-artifact=\"{}\"><img src=\"{}\" alt=\"{}\" style=\"{}\"{}>{}</figure>",
            kind,
            tile.artifact,
            escape(src),
            escape(&tile.caption),
            tile_size(tile),
            if tile.lazy { " loading=\"lazy\"" } else { "" },
            caption
        ),
        TileContent::Placeholder { text, running } => format!(
            "<figure class=\"tile placeholder{}\" data-artifact=\"{}\"><div class=\"placeholder-text {}{}\" style=\"{}\">{}</div>{}</figure>",
            kind,
            tile.artifact,
            tile.tone.css_class(),
            if *running { " spinner" } else { "" },
            tile_size(tile),
            escape(text),
            caption
        ),
    }
}

pub fn render_annotation(index: usize, controls: &AnnotationControls) -> String {
    format!(
        "<div class=\"annotation\" id=\"annotation-{i}\"{}>\
         <label><input type=\"checkbox\"{}{}> exclude</label> \
         <input type=\"text\" class=\"note\" placeholder=\"note\" value=\"{}\"{}>\
         </div>",
        hidden(controls.visible),
        input_attrs(
            &Action::SetExclude {
                subject: index,
                exclude: false
            },
            "exclude",
            "checked"
        ),
        checked(controls.exclude),
        escape(&controls.note),
        input_attrs(
            &Action::SetNote {
                subject: index,
                note: String::new()
            },
            "note",
            "value"
        ),
        i = index,
    )
}

// ─── Live patches ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub index: usize,
    pub html: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFragment {
    pub index: usize,
    pub wrap: bool,
    pub status: String,
    pub gallery: String,
}

/// A view update in the form the page applies it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HtmlPatch {
    Progress { html: String },
    Header { html: String },
    StatusLines { rows: Vec<Fragment> },
    Rows { rows: Vec<RowFragment> },
    Visibility { rows: Vec<VisibilityPatch> },
    Restyle { vars: String },
    Annotations { visible: bool },
    Rebuild { html: String },
}

fn row_fragment(patch: &RowPatch) -> RowFragment {
    RowFragment {
        index: patch.index,
        wrap: patch.wrap,
        status: render_status(&patch.status),
        gallery: render_gallery(&patch.gallery),
    }
}

pub fn patch(update: &ViewUpdate, catalog: &CatalogView) -> HtmlPatch {
    match update {
        ViewUpdate::Progress(progress) => HtmlPatch::Progress {
            html: render_progress(progress),
        },
        ViewUpdate::Header(header) => HtmlPatch::Header {
            html: render_header(header, catalog),
        },
        ViewUpdate::StatusLines(lines) => HtmlPatch::StatusLines {
            rows: lines
                .iter()
                .map(|l| Fragment {
                    index: l.index,
                    html: render_status(&l.status),
                })
                .collect(),
        },
        ViewUpdate::Rows(rows) => HtmlPatch::Rows {
            rows: rows.iter().map(row_fragment).collect(),
        },
        ViewUpdate::Visibility(rows) => HtmlPatch::Visibility { rows: rows.clone() },
        ViewUpdate::Restyle(style) => HtmlPatch::Restyle {
            vars: style_vars(style),
        },
        ViewUpdate::Annotations { visible } => HtmlPatch::Annotations { visible: *visible },
        ViewUpdate::Rebuild(view) => HtmlPatch::Rebuild {
            html: render_dashboard(view, catalog),
        },
    }
}
