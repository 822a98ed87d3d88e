//! Operator-side bulk entry: one charge shape posted to many members at once.
//!
//! A [`BulkDraft`] lives for one operator session and is never persisted.
//! Only [`BulkDraft::submit`] reaches the record store, as a single batch.

use crate::directory::MemberDirectory;
use crate::error::{Result, ValidationError};
use crate::records::{Category, NewCharge, NewRecord, parse_positive_amount};
use crate::store::RecordStore;
use crate::MemberID;
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt;

/// Label used for an "Other" entry when neither the row nor the defaults
/// carry a description.
pub const SPECIAL_ITEM_LABEL: &str = "Special Item";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    Breakfast,
    Lunch,
    Dinner,
    Tea,
    Other,
}

impl fmt::Display for BatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchType::Breakfast => "Breakfast",
            BatchType::Lunch => "Lunch",
            BatchType::Dinner => "Dinner",
            BatchType::Tea => "Tea",
            BatchType::Other => "Other",
        })
    }
}

/// Values shared by every row of one bulk entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDefaults {
    pub batch_type: BatchType,
    pub description: String,
    pub unit_price: String,
}

impl BatchDefaults {
    pub fn new<D: Into<String>, P: Into<String>>(
        batch_type: BatchType,
        description: D,
        unit_price: P,
    ) -> Self {
        Self {
            batch_type,
            description: description.into(),
            unit_price: unit_price.into(),
        }
    }

    /// Charge label for a row carrying `note`.
    pub fn item_label(&self, note: &str) -> String {
        let note = note.trim();
        match self.batch_type {
            BatchType::Other if !note.is_empty() => note.to_string(),
            BatchType::Other if !self.description.trim().is_empty() => {
                self.description.trim().to_string()
            }
            BatchType::Other => SPECIAL_ITEM_LABEL.to_string(),
            meal if !note.is_empty() => format!("{meal} - {note}"),
            meal => meal.to_string(),
        }
    }
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self::new(BatchType::Tea, "", "")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowDraft {
    pub selected: bool,
    pub cost: String,
    pub note: String,
}

impl RowDraft {
    fn seed(&mut self, defaults: &BatchDefaults) {
        if self.cost.is_empty() {
            self.cost = defaults.unit_price.clone();
        }
        if self.note.is_empty() {
            self.note = defaults.description.clone();
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub posted_count: usize,
    /// Members whose rows were committed and cleared.
    pub posted: Vec<MemberID>,
    /// Selected members whose cost was blank, unparseable or not positive.
    pub skipped: Vec<MemberID>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDraft {
    defaults: BatchDefaults,
    rows: BTreeMap<MemberID, RowDraft>,
}

impl BulkDraft {
    pub fn new<I: IntoIterator<Item = MemberID>>(members: I, defaults: BatchDefaults) -> Self {
        Self {
            defaults,
            rows: members.into_iter().map(|id| (id, RowDraft::default())).collect(),
        }
    }

    /// One empty row per billable member.
    pub fn for_directory(directory: &dyn MemberDirectory, defaults: BatchDefaults) -> Self {
        Self::new(directory.members().into_iter().map(|member| member.id), defaults)
    }

    pub fn defaults(&self) -> &BatchDefaults {
        &self.defaults
    }

    /// Changing the defaults never rewrites rows already filled in.
    pub fn set_defaults(&mut self, defaults: BatchDefaults) {
        self.defaults = defaults;
    }

    pub fn row(&self, member: MemberID) -> Option<&RowDraft> {
        self.rows.get(&member)
    }

    pub fn rows(&self) -> impl Iterator<Item = (MemberID, &RowDraft)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn selected_count(&self) -> usize {
        self.rows.values().filter(|row| row.selected).count()
    }

    fn row_mut(&mut self, member: MemberID) -> std::result::Result<&mut RowDraft, ValidationError> {
        self.rows
            .get_mut(&member)
            .ok_or(ValidationError::UnknownMember(member))
    }

    /// Flips selection; a newly selected row picks up the defaults for any
    /// field still empty. Returns the new selection state.
    pub fn toggle(&mut self, member: MemberID) -> std::result::Result<bool, ValidationError> {
        let defaults = self.defaults.clone();
        let row = self.row_mut(member)?;
        row.selected = !row.selected;
        if row.selected {
            row.seed(&defaults);
        }
        Ok(row.selected)
    }

    /// Editing a field selects the row.
    pub fn set_cost<S: Into<String>>(
        &mut self,
        member: MemberID,
        cost: S,
    ) -> std::result::Result<(), ValidationError> {
        let row = self.row_mut(member)?;
        row.cost = cost.into();
        row.selected = true;
        Ok(())
    }

    pub fn set_note<S: Into<String>>(
        &mut self,
        member: MemberID,
        note: S,
    ) -> std::result::Result<(), ValidationError> {
        let row = self.row_mut(member)?;
        row.note = note.into();
        row.selected = true;
        Ok(())
    }

    /// Deselects everything when every row is selected; otherwise selects
    /// every row, seeding empty fields from the defaults.
    pub fn select_all(&mut self) {
        let all_selected = self.rows.values().all(|row| row.selected);
        for row in self.rows.values_mut() {
            row.selected = !all_selected;
            if !all_selected {
                row.seed(&self.defaults);
            }
        }
    }

    /// Overwrites cost and note of every selected row with the defaults.
    pub fn apply_defaults_to_selected(&mut self) {
        for row in self.rows.values_mut().filter(|row| row.selected) {
            row.cost = self.defaults.unit_price.clone();
            row.note = self.defaults.description.clone();
        }
    }

    /// Posts every selected row with a positive cost as one messing charge,
    /// all in a single all-or-nothing commit dated `date`.
    ///
    /// Back-dated and future-dated entries are both accepted. On failure the
    /// draft is left exactly as it was; on success only the posted rows are
    /// cleared and skipped rows stay selected for correction.
    pub fn submit(&mut self, store: &dyn RecordStore, date: NaiveDate) -> Result<BulkOutcome> {
        let selected: Vec<MemberID> = self
            .rows
            .iter()
            .filter(|(_, row)| row.selected)
            .map(|(id, _)| *id)
            .collect();
        if selected.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        let mut outcome = BulkOutcome::default();
        let mut batch = Vec::new();
        for id in selected.iter().copied() {
            let row = &self.rows[&id];
            match parse_positive_amount(&row.cost) {
                Ok(cost) => {
                    let label = self.defaults.item_label(&row.note);
                    batch.push(NewRecord::Charge(NewCharge::single(
                        id,
                        date,
                        Category::Messing,
                        label,
                        cost,
                    )));
                    outcome.posted.push(id);
                }
                Err(err) => {
                    warn!("Skipping bulk row for member {id}: {err}");
                    outcome.skipped.push(id);
                }
            }
        }
        if batch.is_empty() {
            return Err(ValidationError::NoPostableRows(selected.len()).into());
        }

        store.batch_create(batch)?;
        for id in &outcome.posted {
            if let Some(row) = self.rows.get_mut(id) {
                row.clear();
            }
        }
        outcome.posted_count = outcome.posted.len();
        info!(
            "Posted {} {} charges for {date} ({} skipped)",
            outcome.posted_count,
            self.defaults.batch_type,
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}
