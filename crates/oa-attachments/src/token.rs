//! Attachment Tokens
//!
//! A token packs the fields that locate an attachment into one URL path
//! segment:
//!
//! ```text
//! base64("<parent class>|<field name>|<parent id>|<access type>|<original filename>")
//! ```
//!
//! with every `/` of the base64 output replaced by `_`. Tokens end up in
//! links that have already been handed out, so the field order and the
//! separator cannot change.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use oa_core::traits::Id;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AccessType, AttachmentDescriptor};

/// Field separator inside a decoded token
pub const SEPARATOR: char = '|';

const FIELD_COUNT: usize = 5;

/// Rejection reasons for a token
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidToken {
    #[error("Input string is not correct attachment encoded parameters: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Input string is not correct attachment encoded parameters: empty payload")]
    Empty,
    #[error("Input string is not correct attachment encoded parameters: payload is not UTF-8")]
    NotUtf8,
    #[error("Input string is not correct attachment encoded parameters: expected 5 fields, found {found}")]
    TooFewFields { found: usize },
    #[error("Invalid {field} in attachment token: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// The raw fields of a decoded token, in wire order.
///
/// The parent id is still text here; see [`AttachmentDescriptor`] for the
/// parsed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParts {
    pub parent_class: String,
    pub field_name: String,
    pub parent_id: String,
    pub access_type: String,
    pub original_filename: String,
}

impl TokenParts {
    /// Parse the id and access type
    pub fn descriptor(&self) -> Result<AttachmentDescriptor, InvalidToken> {
        AttachmentDescriptor::try_from(self.clone())
    }
}

/// Build the token for an attachment.
///
/// No field may contain [`SEPARATOR`]; the original filename is the one
/// exception, since decoding splits into at most five fields.
pub fn encode(
    parent_class: &str,
    parent_id: Id,
    field_name: &str,
    access: AccessType,
    original_filename: &str,
) -> String {
    let joined = format!(
        "{parent_class}{SEPARATOR}{field_name}{SEPARATOR}{parent_id}{SEPARATOR}{access}{SEPARATOR}{original_filename}"
    );
    STANDARD.encode(joined).replace('/', "_")
}

/// Split a token back into its fields.
///
/// Tokens arrive straight from request paths: every malformed input is
/// reported as [`InvalidToken`].
pub fn decode(token: &str) -> Result<TokenParts, InvalidToken> {
    let bytes = STANDARD.decode(token.replace('_', "/"))?;
    if bytes.is_empty() {
        return Err(InvalidToken::Empty);
    }
    let decoded = String::from_utf8(bytes).map_err(|_| InvalidToken::NotUtf8)?;

    let fields: Vec<&str> = decoded.splitn(FIELD_COUNT, SEPARATOR).collect();
    match fields.as_slice() {
        [parent_class, field_name, parent_id, access_type, original_filename] => Ok(TokenParts {
            parent_class: parent_class.to_string(),
            field_name: field_name.to_string(),
            parent_id: parent_id.to_string(),
            access_type: access_type.to_string(),
            original_filename: original_filename.to_string(),
        }),
        _ => Err(InvalidToken::TooFewFields {
            found: fields.len(),
        }),
    }
}

impl AttachmentDescriptor {
    /// Token for this descriptor
    pub fn encode(&self) -> String {
        encode(
            &self.parent_class,
            self.parent_id,
            &self.field_name,
            self.access,
            &self.original_filename,
        )
    }

    /// Decode and parse a token
    pub fn from_token(token: &str) -> Result<Self, InvalidToken> {
        decode(token)?.descriptor()
    }
}

impl TryFrom<TokenParts> for AttachmentDescriptor {
    type Error = InvalidToken;

    fn try_from(parts: TokenParts) -> Result<Self, Self::Error> {
        let parent_id = parts
            .parent_id
            .parse::<Id>()
            .ok()
            .filter(|id| *id >= 0)
            .ok_or_else(|| InvalidToken::InvalidField {
                field: "parent id",
                value: parts.parent_id.clone(),
            })?;
        let access =
            AccessType::from_str(&parts.access_type).ok_or_else(|| InvalidToken::InvalidField {
                field: "access type",
                value: parts.access_type.clone(),
            })?;

        Ok(Self {
            parent_class: parts.parent_class,
            parent_id,
            field_name: parts.field_name,
            access,
            original_filename: parts.original_filename,
        })
    }
}
