//! Stage catalog: the ordered pipeline stages and the output artifacts each
//! stage produces.
//!
//! The built-in table describes the BrainSuite anatomical, diffusion and
//! functional pipelines. A dashboard config document may replace any of the
//! three tables wholesale at startup; the result is validated once and never
//! merged field-by-field afterwards.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DashError, Result};

/// A named visual output (image) of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    /// Image file name inside the subject's output directory.
    #[serde(rename = "img")]
    pub image: String,
    /// Owning stage, 1-based.
    pub stage: usize,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(default)]
    pub group: usize,
    /// Rendered surface snapshot (as opposed to a volume slice).
    #[serde(default)]
    pub surface: bool,
    /// Visible by default.
    #[serde(default = "default_show")]
    pub show: bool,
    /// Fixed display width in pixels, 0 when unset.
    #[serde(default)]
    pub width: u32,
    /// Fixed display height in pixels, 0 when unset.
    #[serde(default)]
    pub height: u32,
}

fn default_show() -> bool {
    true
}

impl OutputArtifact {
    fn new(image: &str, stage: usize, description: &str, group: usize, surface: bool) -> Self {
        Self {
            image: image.to_string(),
            stage,
            description: description.to_string(),
            group,
            surface,
            show: true,
            width: 0,
            height: 0,
        }
    }

    fn sized(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Zero-based position of the owning stage in a status string.
    pub fn stage_index(&self) -> usize {
        self.stage.saturating_sub(1)
    }

    pub fn fixed_width(&self) -> Option<u32> {
        (self.width > 0).then_some(self.width)
    }

    pub fn fixed_height(&self) -> Option<u32> {
        (self.height > 0).then_some(self.height)
    }
}

/// Optional `brainsuite_dashboard_config` document. Every table that is
/// present replaces the built-in one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(rename = "Contents", default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<OutputArtifact>>,
    #[serde(rename = "StageNames", default, skip_serializing_if = "Option::is_none")]
    pub stage_names: Option<Vec<String>>,
    #[serde(rename = "GroupNames", default, skip_serializing_if = "Option::is_none")]
    pub group_names: Option<Vec<String>>,
}

/// Which artifacts a group filter selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "group")]
pub enum GroupFilter {
    All,
    Group(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub stage_names: Vec<String>,
    pub group_names: Vec<String>,
    pub artifacts: Vec<OutputArtifact>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::brainsuite()
    }
}

impl Catalog {
    /// The built-in BrainSuite stage and output table.
    pub fn brainsuite() -> Self {
        let stage_names = [
            "bse",
            "bfc",
            "pvc",
            "cerebro",
            "cortex",
            "scrub mask",
            "tca",
            "dewisp",
            "inner cortical surface",
            "pial surface",
            "hemisplit",
            "thickness",
            "svreg",
            "bdp",
            "bfp",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let group_names = ["CSE", "Thickness", "SVReg", "BDP", "BFP"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        type A = OutputArtifact;
        let artifacts = vec![
            // CSE
            A::new("bse.png", 1, "Orig + BSE Mask", 0, false),
            A::new("bfc.png", 2, "BFC", 0, false),
            A::new("pvc.png", 3, "PVC", 0, false),
            A::new("hemilabel.png", 4, "Orig + Hemi Label", 0, false),
            A::new("cerebro.png", 4, "Orig + Cerebrum Mask", 0, false),
            A::new("dewisp.png", 8, "BFC + Dewisp (axial)", 0, false),
            A::new("dewispCor.png", 8, "BFC + Dewisp (coronal)", 0, false),
            A::new("dfsLeft.png", 9, "Inner Cortex (left)", 0, true).sized(256, 256),
            A::new("dfsRight.png", 9, "Inner Cortex (right)", 0, true).sized(256, 256),
            A::new("dfsSup.png", 9, "Inner Cortex (superior)", 0, true).sized(256, 256),
            A::new("dfsInf.png", 9, "Inner Cortex (inferior)", 0, true).sized(256, 256),
            A::new("hemisplit.png", 11, "Pial Cortex (HemiSplit)", 0, true).sized(256, 256),
            // Thickness
            A::new("ThickdfsLeft.png", 12, "Thickness PVC (left)", 1, true).sized(256, 256),
            A::new("ThickdfsRight.png", 12, "Thickness PVC (right)", 1, true).sized(256, 256),
            A::new("ThickdfsSup.png", 12, "Thickness PVC (sup)", 1, true).sized(256, 256),
            A::new("ThickdfsInf.png", 12, "Thickness PVC (inf)", 1, true).sized(256, 256),
            // SVReg
            A::new("SVREGdfsLeft.png", 13, "SVReg Mid Cortex (left)", 2, true).sized(256, 256),
            A::new("SVREGdfsRight.png", 13, "SVReg Mid Cortex (right)", 2, true).sized(256, 256),
            A::new("SVREGdfsSup.png", 13, "SVReg Mid Cortex (superior)", 2, true).sized(256, 256),
            A::new("SVREGdfsInf.png", 13, "SVReg Mid Cortex (inferior)", 2, true).sized(256, 256),
            A::new("SVREGdfsAnt.png", 13, "SVReg Mid Cortex (anterior)", 2, true).sized(256, 256),
            A::new("SVREGdfsPos.png", 13, "SVReg Mid Cortex (posterior)", 2, true).sized(256, 256),
            A::new("svregLabel.png", 13, "BFC + SVReg Label (axial)", 2, false),
            A::new("svregLabelCor.png", 13, "BFC + SVReg Label (coronal)", 2, false),
            A::new("svregLabelSag.png", 13, "BFC + SVReg Label (sagittal)", 2, false),
            // BDP
            A::new("PreCorrDWI.png", 14, "PRECORRECT", 3, false).sized(256, 0),
            A::new("PreCorrDWIsag.png", 14, "PRECORRECT", 3, false).sized(256, 0),
            A::new("PostCorrDWI.png", 14, "POSTCORRECT", 3, false).sized(256, 0),
            A::new("PostCorrDWIsag.png", 14, "POSTCORRECT", 3, false).sized(256, 0),
            A::new("FApvc.png", 14, "FA PVC", 3, false),
            A::new("FA.png", 14, "FA", 3, false),
            A::new("colorFA.png", 14, "COLOR FA", 3, false),
            A::new("mADC.png", 14, "mADC", 3, false),
            // BFP
            A::new("ssim.png", 15, "SSIM", 4, false).sized(256, 0),
            A::new("mco.png", 15, "MCO", 4, false).sized(256, 0),
            A::new("Func2T1.png", 15, "FUNC2T1 T1 MASK", 4, false),
            A::new("PreCorrFunc.png", 15, "PRECORRECT", 4, false),
            A::new("PreCorrFuncSag.png", 15, "PRECORRECT", 4, false),
            A::new("PostCorrFunc.png", 15, "POSTCORRECT", 4, false),
            A::new("PostCorrFuncSag.png", 15, "POSTCORRECT", 4, false),
        ];

        Self {
            stage_names,
            group_names,
            artifacts,
        }
    }

    /// Build a catalog from a config document. Tables absent from the document
    /// keep their built-in values.
    pub fn from_config(config: DashboardConfig) -> Result<Self> {
        let mut catalog = Self::brainsuite();
        if let Some(contents) = config.contents {
            catalog.artifacts = contents;
        }
        if let Some(stage_names) = config.stage_names {
            catalog.stage_names = stage_names;
        }
        if let Some(group_names) = config.group_names {
            catalog.group_names = group_names;
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Choose the catalog once at startup: the validated replacement when a
    /// config document is present and sound, the built-in table otherwise.
    pub fn resolve(config: Option<DashboardConfig>) -> Self {
        match config {
            None => Self::brainsuite(),
            Some(config) => match Self::from_config(config) {
                Ok(catalog) => {
                    info!(
                        stages = catalog.stage_count(),
                        artifacts = catalog.artifacts.len(),
                        "Using dashboard config catalog"
                    );
                    catalog
                }
                Err(e) => {
                    warn!("Ignoring dashboard config: {}", e);
                    Self::brainsuite()
                }
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stage_names.is_empty() {
            return Err(DashError::InvalidCatalog("no stages defined".into()));
        }
        for (i, artifact) in self.artifacts.iter().enumerate() {
            if artifact.stage == 0 || artifact.stage > self.stage_names.len() {
                return Err(DashError::InvalidCatalog(format!(
                    "artifact {} ({}) references stage {} but only {} stages exist",
                    i,
                    artifact.image,
                    artifact.stage,
                    self.stage_names.len()
                )));
            }
            if artifact.image.trim().is_empty() {
                return Err(DashError::InvalidCatalog(format!(
                    "artifact {} has an empty image name",
                    i
                )));
            }
        }
        Ok(())
    }

    pub fn stage_count(&self) -> usize {
        self.stage_names.len()
    }

    /// Name of the stage at zero-based `index`.
    pub fn stage_name(&self, index: usize) -> &str {
        self.stage_names
            .get(index)
            .map(String::as_str)
            .unwrap_or("unknown stage")
    }

    /// Display name of a group; unnamed groups fall back to "Group N".
    pub fn group_name(&self, group: usize) -> String {
        self.group_names
            .get(group)
            .cloned()
            .unwrap_or_else(|| format!("Group {}", group))
    }

    /// Distinct groups in order of first appearance.
    pub fn groups(&self) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        self.artifacts
            .iter()
            .map(|a| a.group)
            .filter(|g| seen.insert(*g))
            .collect()
    }

    /// Indices of the artifacts shown before any filter is applied.
    pub fn default_visible(&self) -> BTreeSet<usize> {
        self.artifacts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.show)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices selected by a group filter.
    pub fn select(&self, filter: GroupFilter) -> Result<BTreeSet<usize>> {
        match filter {
            GroupFilter::All => Ok((0..self.artifacts.len()).collect()),
            GroupFilter::Group(group) => {
                let known = self.groups();
                if !known.contains(&group) && group >= self.group_names.len() {
                    return Err(DashError::GroupOutOfRange {
                        index: group,
                        len: self.group_names.len(),
                    });
                }
                Ok(self
                    .artifacts
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.group == group)
                    .map(|(i, _)| i)
                    .collect())
            }
        }
    }
}
