use serde::Deserialize;

use crate::{OverseerError, Result};

/// The part of `GET /api/v1/{movie|tv}/{id}` the client reads.
#[derive(Debug, Default, Deserialize)]
pub struct MediaDetails {
    #[serde(rename = "mediaInfo", default)]
    pub media_info: Option<MediaInfo>,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: Option<i64>,
}

impl MediaDetails {
    /// `mediaInfo.id` when present and non-zero, else top-level `id` under
    /// the same rule.
    pub fn media_id(&self) -> Option<i64> {
        self.media_info
            .as_ref()
            .and_then(|info| info.id)
            .filter(|id| *id != 0)
            .or_else(|| self.id.filter(|id| *id != 0))
    }
}

/// Extracts the upstream media id from a lookup response body.
///
/// A body that parses but has no usable id yields
/// [`OverseerError::MissingMediaId`].
pub(crate) fn parse_media_id(body: &str) -> Result<i64> {
    let details: MediaDetails = serde_json::from_str(body)
        .map_err(|err| OverseerError::Decode(format!("invalid media response JSON: {err}")))?;
    details.media_id().ok_or(OverseerError::MissingMediaId)
}

#[cfg(test)]
mod tests {
    use super::parse_media_id;
    use crate::OverseerError;

    #[test]
    fn prefers_nested_media_info_id() {
        assert_eq!(
            parse_media_id(r#"{"id": 550, "mediaInfo": {"id": 12}}"#).expect("id must parse"),
            12
        );
    }

    #[test]
    fn falls_back_to_top_level_id() {
        assert_eq!(parse_media_id(r#"{"id": 999}"#).expect("id must parse"), 999);
        assert_eq!(
            parse_media_id(r#"{"id": 7, "mediaInfo": {"id": 0}}"#).expect("id must parse"),
            7
        );
        assert_eq!(
            parse_media_id(r#"{"id": 7, "mediaInfo": null}"#).expect("id must parse"),
            7
        );
    }

    #[test]
    fn zero_or_missing_ids_are_absent() {
        for body in [r#"{}"#, r#"{"id": 0}"#, r#"{"mediaInfo": {}, "title": "x"}"#] {
            assert!(
                matches!(parse_media_id(body), Err(OverseerError::MissingMediaId)),
                "{body} must have no id"
            );
        }
    }

    #[test]
    fn non_json_body_is_a_decode_error() {
        assert!(matches!(
            parse_media_id("<html>bad gateway</html>"),
            Err(OverseerError::Decode(_))
        ));
    }
}
