use std::collections::HashMap;

pub const API_TOKEN_HEADER: &str = "x-api-token";

/// Maps API tokens to the user they act for.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl TokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Resolves the caller from an `Authorization: Bearer` value, falling back to `x-api-token`.
    pub fn resolve(&self, authorization: Option<&str>, api_token: Option<&str>) -> Option<String> {
        let bearer = authorization.and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });
        bearer
            .into_iter()
            .chain(api_token.map(str::trim))
            .filter(|token| !token.is_empty())
            .find_map(|token| self.tokens.get(token).cloned())
    }
}
