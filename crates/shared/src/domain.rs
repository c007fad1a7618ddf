use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Stable key of a valuation row across reloads of the external row list.
id_newtype!(SrdId);

/// Opaque per-row capability authorizing field commits and uploads.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteToken(String);

impl InviteToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form safe for log lines.
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InviteToken").field(&self.redacted()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyField {
    AsIs,
    Arv,
    Rehab,
}

impl CurrencyField {
    pub const ALL: [CurrencyField; 3] = [Self::AsIs, Self::Arv, Self::Rehab];

    pub fn label(self) -> &'static str {
        match self {
            Self::AsIs => "as-is",
            Self::Arv => "arv",
            Self::Rehab => "rehab",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "as-is" | "as_is" | "asis" => Some(Self::AsIs),
            "arv" => Some(Self::Arv),
            "rehab" => Some(Self::Rehab),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Document,
}

impl AttachmentKind {
    /// Path segment of the upload endpoint for this kind.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Photo => "photos",
            Self::Document => "documents",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_token_hides_tail() {
        let token = InviteToken::new("abcd-secret-tail");
        assert_eq!(token.redacted(), "abcd…");
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[test]
    fn currency_field_labels_round_trip() {
        for field in CurrencyField::ALL {
            assert_eq!(CurrencyField::from_label(field.label()), Some(field));
        }
        assert_eq!(CurrencyField::from_label("AS_IS"), Some(CurrencyField::AsIs));
        assert_eq!(CurrencyField::from_label("value"), None);
    }
}
