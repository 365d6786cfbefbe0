//! Pointer file URLs
//!
//! Every pointer file holds one absolute URL addressing the redirect endpoint:
//!
//! - private files: `{address}/redirect_url?apikey={token}&pickcode={pickcode}`
//! - shared files: `{address}/redirect_url?apikey={token}&share_code=..&receive_code=..&id=..`
//!
//! The `apikey` parameter is omitted when no token is configured.

use bridge_traits::drive::{Pickcode, ShareContext};
use core_runtime::config::REDIRECT_PATH;

/// Builds pointer URLs against one redirect server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerUrlBuilder {
    base: String,
    api_token: Option<String>,
}

impl PointerUrlBuilder {
    pub fn new(server_address: &str, api_token: Option<&str>) -> Self {
        Self {
            base: server_address.trim().trim_end_matches('/').to_string(),
            api_token: api_token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }

    /// URL for a file in the session's own drive
    pub fn private(&self, pickcode: &Pickcode) -> String {
        self.build(&[("pickcode", pickcode.as_str())])
    }

    /// URL for a file inside a share
    pub fn share(&self, share: &ShareContext, file_id: &str) -> String {
        self.build(&[
            ("share_code", share.share_code.as_str()),
            ("receive_code", share.receive_code.as_str()),
            ("id", file_id),
        ])
    }

    fn build(&self, params: &[(&str, &str)]) -> String {
        let mut query: Vec<String> = Vec::with_capacity(params.len() + 1);
        if let Some(token) = &self.api_token {
            query.push(format!("apikey={}", urlencoding::encode(token)));
        }
        query.extend(
            params
                .iter()
                .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value))),
        );

        format!("{}{}?{}", self.base, REDIRECT_PATH, query.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_url() {
        let builder = PointerUrlBuilder::new("http://nas:29876/", Some("secret"));
        let pickcode = Pickcode::parse("abcdefghijklmno12").unwrap();

        assert_eq!(
            builder.private(&pickcode),
            "http://nas:29876/redirect_url?apikey=secret&pickcode=abcdefghijklmno12"
        );
    }

    #[test]
    fn test_private_url_without_token() {
        let builder = PointerUrlBuilder::new("http://nas:29876", Some("  "));
        let pickcode = Pickcode::parse("ABCDEFGHIJKLMNO12").unwrap();

        assert_eq!(
            builder.private(&pickcode),
            "http://nas:29876/redirect_url?pickcode=abcdefghijklmno12"
        );
    }

    #[test]
    fn test_share_url_is_encoded() {
        let builder = PointerUrlBuilder::new("https://media.example.com/api", Some("t&k"));
        let share = ShareContext::new("swabc12", "ab 1");

        assert_eq!(
            builder.share(&share, "3001"),
            "https://media.example.com/api/redirect_url?apikey=t%26k&share_code=swabc12&receive_code=ab%201&id=3001"
        );
    }
}
