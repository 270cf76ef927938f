//! Per-subject QC annotations and their TSV export.
//!
//! Annotations live only for the session. Export produces the text of a
//! download; nothing is ever written back to the QC directory.

use serde::{Deserialize, Serialize};

use crate::error::{DashError, Result};

pub const EXPORT_FILE_NAME: &str = "BrainSuiteQCExcludeList.tsv";

const SEP: char = '\t';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub exclude: bool,
    pub note: String,
}

/// Annotations parallel to the subject list.
#[derive(Debug, Clone, Default)]
pub struct AnnotationSheet {
    entries: Vec<Annotation>,
}

impl AnnotationSheet {
    pub fn new(subject_count: usize) -> Self {
        Self {
            entries: vec![Annotation::default(); subject_count],
        }
    }

    fn entry_mut(&mut self, subject: usize) -> Result<&mut Annotation> {
        let len = self.entries.len();
        self.entries
            .get_mut(subject)
            .ok_or(DashError::SubjectOutOfRange {
                index: subject,
                len,
            })
    }

    pub fn set_exclude(&mut self, subject: usize, exclude: bool) -> Result<()> {
        self.entry_mut(subject)?.exclude = exclude;
        Ok(())
    }

    pub fn set_note(&mut self, subject: usize, note: impl Into<String>) -> Result<()> {
        self.entry_mut(subject)?.note = note.into();
        Ok(())
    }

    pub fn get(&self, subject: usize) -> Option<&Annotation> {
        self.entries.get(subject)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `participant_id`, `Exclude` (0/1), `Note` (quoted), one row per subject
    /// in subject-list order.
    pub fn export_tsv(&self, subjects: &[String]) -> String {
        let mut out = format!("participant_id{SEP}Exclude{SEP}Note\n");
        for (i, subject) in subjects.iter().enumerate() {
            let annotation = self.entries.get(i).cloned().unwrap_or_default();
            out.push_str(&format!(
                "{}{SEP}{}{SEP}{}\n",
                subject,
                u8::from(annotation.exclude),
                quote_note(&annotation.note)
            ));
        }
        out
    }
}

/// Wrap a note in double quotes. Embedded quotes are doubled and tabs or line
/// breaks become spaces so every subject stays on one row.
fn quote_note(note: &str) -> String {
    let flat: String = note
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect();
    format!("\"{}\"", flat.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects() -> Vec<String> {
        ["sub-01", "sub-02", "sub-03"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn export_one_row_per_subject_in_order() {
        let mut sheet = AnnotationSheet::new(3);
        sheet.set_exclude(1, true).unwrap();
        sheet.set_note(1, "motion artifacts").unwrap();
        sheet.set_note(2, "ok").unwrap();

        let tsv = sheet.export_tsv(&subjects());
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "participant_id\tExclude\tNote",
                "sub-01\t0\t\"\"",
                "sub-02\t1\t\"motion artifacts\"",
                "sub-03\t0\t\"ok\"",
            ]
        );
    }

    #[test]
    fn notes_cannot_break_rows() {
        let mut sheet = AnnotationSheet::new(1);
        sheet.set_note(0, "bad\tskull \"strip\"\nredo").unwrap();
        let tsv = sheet.export_tsv(&subjects()[..1]);
        assert_eq!(
            tsv.lines().nth(1),
            Some("sub-01\t0\t\"bad skull \"\"strip\"\" redo\"")
        );
        assert_eq!(tsv.lines().count(), 2);
    }

    #[test]
    fn out_of_range_subject() {
        let mut sheet = AnnotationSheet::new(1);
        assert!(matches!(
            sheet.set_exclude(1, true),
            Err(DashError::SubjectOutOfRange { index: 1, len: 1 })
        ));
    }
}
