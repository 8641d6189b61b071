use base64::prelude::*;

use crate::core::error::{AppError, Result};

/// Opaque continuation token for [`super::MetadataStore::list`].
///
/// Wraps the id of the last record handed out; clients only ever see the
/// encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCursor {
    last_id: String,
}

impl ListCursor {
    pub fn after(last_id: impl Into<String>) -> Self {
        Self {
            last_id: last_id.into(),
        }
    }

    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    pub fn encode(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(self.last_id.as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || AppError::Validation("Invalid pagination cursor".to_string());

        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| invalid())?;
        let last_id = String::from_utf8(bytes).map_err(|_| invalid())?;
        if last_id.is_empty() {
            return Err(invalid());
        }

        Ok(Self { last_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_decodes_what_it_encodes() {
        let cursor = ListCursor::after("0b6f4c1e-6f53-4d43-9d0c-7c1f4f5f0a11");
        assert_eq!(ListCursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        for token in ["", "!!!", "%%%"] {
            assert!(matches!(
                ListCursor::decode(token),
                Err(AppError::Validation(_))
            ));
        }
    }
}
