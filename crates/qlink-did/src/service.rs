//! Service endpoints

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// `<did>#<fragment>`
    pub id: String,

    #[serde(rename = "type")]
    pub type_: String,

    pub service_endpoint: String,
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        type_: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            service_endpoint: endpoint.into(),
        }
    }
}
