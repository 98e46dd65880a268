//! Document descriptors - one entry per viewable report

use std::fmt;

/// Immutable record describing one viewable document.
///
/// The viewer core never looks inside the display metadata; it only hands
/// `source_reference` to the byte source when a render starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentDescriptor {
    /// Stable identifier (biopsy number), unique within a catalog
    pub id: String,
    pub patient_name: String,
    pub patient_id: String,
    /// Display date as provided by the catalog source
    pub date: String,
    /// Requesting service, when the backend reports one
    pub service: Option<String>,
    /// Treating physician, when the backend reports one
    pub physician: Option<String>,
    /// Opaque locator resolved by the document byte source
    pub source_reference: String,
}

impl DocumentDescriptor {
    /// Create a descriptor with only the fields the viewer needs.
    #[must_use]
    pub fn new(id: impl Into<String>, source_reference: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            patient_name: String::new(),
            patient_id: String::new(),
            date: String::new(),
            service: None,
            physician: None,
            source_reference: source_reference.into(),
        }
    }

    #[must_use]
    pub fn with_patient(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.patient_name = name.into();
        self.patient_id = id.into();
        self
    }

    #[must_use]
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }
}

impl fmt::Display for DocumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Biopsy {}", self.id)?;
        if !self.patient_name.is_empty() {
            write!(f, " - {}", self.patient_name)?;
        }
        if !self.date.is_empty() {
            write!(f, " ({})", self.date)?;
        }
        Ok(())
    }
}
