use serde::{Deserialize, Serialize};

/// Identifier an order or authorization is about.
///
/// Only `dns` identifiers are produced by this library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub _type: String,
    pub value: String,
}

impl Identifier {
    pub(crate) fn dns(value: &str) -> Self {
        Identifier {
            _type: "dns".to_owned(),
            value: value.to_owned(),
        }
    }
}
