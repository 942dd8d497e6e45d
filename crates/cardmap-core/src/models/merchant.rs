use serde::{Deserialize, Serialize};

use crate::proximity::GeoPoint;

/// A store shown on the map, with the card that pays best there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub location: GeoPoint,
    #[serde(default)]
    pub best_card: Option<String>,
    #[serde(default)]
    pub benefit: Option<String>,
}

impl Merchant {
    pub fn benefit_display(&self) -> String {
        match (&self.best_card, &self.benefit) {
            (Some(card), Some(benefit)) => format!("{} ({})", card, benefit),
            (Some(card), None) => card.clone(),
            (None, Some(benefit)) => benefit.clone(),
            (None, None) => "No card benefit".to_string(),
        }
    }
}
