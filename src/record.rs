use serde::{Deserialize, Serialize};

/// A project summary parsed from one listing card, not yet enriched or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Index of the card on the live listing page, counting cards that failed to parse.
    pub position: usize,
    pub name: String,
    pub natural_key: String,
    pub promoter_name: String,
    pub address: Option<String>,
}

/// Promoter attributes read from the detail view's "Promoter Details" tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoterDetails {
    pub company_name: Option<String>,
    pub registration_no: Option<String>,
    pub correspondence_office_address: Option<String>,
    pub registered_office_address: Option<String>,
    pub entity_type: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub telephone: Option<String>,
    pub gst_no: Option<String>,
}

impl PromoterDetails {
    pub fn populated(&self) -> usize {
        [
            &self.company_name,
            &self.registration_no,
            &self.correspondence_office_address,
            &self.registered_office_address,
            &self.entity_type,
            &self.email,
            &self.mobile,
            &self.telephone,
            &self.gst_no,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promoter {
    pub name: String,
    /// `None` until the detail view has been visited; `Some` even when every field came back blank.
    pub details: Option<PromoterDetails>,
}

/// The unit of persistence. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub natural_key: String,
    pub name: String,
    pub address: Option<String>,
    pub promoter: Promoter,
}

impl ProjectRecord {
    pub fn assemble(candidate: Candidate, details: Option<PromoterDetails>) -> Self {
        ProjectRecord {
            natural_key: candidate.natural_key,
            name: candidate.name,
            address: candidate.address,
            promoter: Promoter {
                name: candidate.promoter_name,
                details,
            },
        }
    }
}

/// A record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredProject {
    pub id: i64,
    #[serde(flatten)]
    pub record: ProjectRecord,
}
