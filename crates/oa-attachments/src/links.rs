//! Link Generation
//!
//! Attachment links are produced by a [`LinkGenerator`] from a route name and
//! a parameter map. [`RouteTable`] is a template based implementation.

use std::collections::{BTreeMap, HashMap};

use oa_core::config::LinkConfig;
use thiserror::Error;

/// Route parameters, ordered so generated query strings are stable
pub type RouteParams = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Unknown route: {0}")]
    UnknownRoute(String),
    #[error("Missing parameter {param} for route {route}")]
    MissingParameter { route: String, param: String },
    #[error("Malformed template for route {0}")]
    MalformedTemplate(String),
}

/// Builds URLs for named routes
pub trait LinkGenerator: Send + Sync {
    fn generate(
        &self,
        route: &str,
        params: &RouteParams,
        absolute: bool,
    ) -> Result<String, LinkError>;
}

/// Route templates with `{param}` placeholders.
///
/// Placeholder values are percent-encoded; parameters without a placeholder
/// are appended as a query string.
#[derive(Debug, Clone)]
pub struct RouteTable {
    base_url: String,
    routes: HashMap<String, String>,
}

impl RouteTable {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routes: HashMap::new(),
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        let mut table = Self::new(config.base_url.clone());
        table.routes = config.routes.clone();
        table
    }

    /// Register a route template
    pub fn route(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.routes.insert(name.into(), template.into());
        self
    }
}

impl LinkGenerator for RouteTable {
    fn generate(
        &self,
        route: &str,
        params: &RouteParams,
        absolute: bool,
    ) -> Result<String, LinkError> {
        let template = self
            .routes
            .get(route)
            .ok_or_else(|| LinkError::UnknownRoute(route.to_string()))?;

        let mut path = String::with_capacity(template.len());
        let mut used = Vec::new();
        let mut rest = template.as_str();

        while let Some(open) = rest.find('{') {
            path.push_str(&rest[..open]);
            let close = rest[open..]
                .find('}')
                .map(|offset| open + offset)
                .ok_or_else(|| LinkError::MalformedTemplate(route.to_string()))?;
            let name = &rest[open + 1..close];
            let value = params
                .get(name)
                .ok_or_else(|| LinkError::MissingParameter {
                    route: route.to_string(),
                    param: name.to_string(),
                })?;
            path.push_str(&urlencoding::encode(value));
            used.push(name);
            rest = &rest[close + 1..];
        }
        path.push_str(rest);

        let query: Vec<String> = params
            .iter()
            .filter(|(name, _)| !used.contains(&name.as_str()))
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect();
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }

        if absolute {
            Ok(format!("{}{}", self.base_url, path))
        } else {
            Ok(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RouteParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn table() -> RouteTable {
        RouteTable::new("https://crm.example.com/")
            .route("file", "/attachment/{codedString}.{extension}")
            .route("broken", "/attachment/{codedString")
    }

    #[test]
    fn test_fills_placeholders() {
        let url = table()
            .generate("file", &params(&[("codedString", "QXxm"), ("extension", "pdf")]), false)
            .unwrap();
        assert_eq!(url, "/attachment/QXxm.pdf");
    }

    #[test]
    fn test_absolute_url() {
        let url = table()
            .generate("file", &params(&[("codedString", "QXxm"), ("extension", "pdf")]), true)
            .unwrap();
        assert_eq!(url, "https://crm.example.com/attachment/QXxm.pdf");
    }

    #[test]
    fn test_encodes_values() {
        let url = table()
            .generate(
                "file",
                &params(&[("codedString", "ab+c="), ("extension", "p f")]),
                false,
            )
            .unwrap();
        assert_eq!(url, "/attachment/ab%2Bc%3D.p%20f");
    }

    #[test]
    fn test_extra_params_become_query() {
        let url = table()
            .generate(
                "file",
                &params(&[("codedString", "x"), ("extension", "png"), ("v", "2"), ("a", "1")]),
                false,
            )
            .unwrap();
        assert_eq!(url, "/attachment/x.png?a=1&v=2");
    }

    #[test]
    fn test_errors() {
        let table = table();
        assert_eq!(
            table.generate("nope", &RouteParams::new(), false),
            Err(LinkError::UnknownRoute("nope".to_string()))
        );
        assert_eq!(
            table.generate("file", &params(&[("codedString", "x")]), false),
            Err(LinkError::MissingParameter {
                route: "file".to_string(),
                param: "extension".to_string(),
            })
        );
        assert_eq!(
            table.generate("broken", &params(&[("codedString", "x")]), false),
            Err(LinkError::MalformedTemplate("broken".to_string()))
        );
    }

    #[test]
    fn test_from_default_config() {
        let table = RouteTable::from_config(&LinkConfig::default());
        let url = table
            .generate(
                oa_core::config::ROUTE_FILTERED_ATTACHMENT,
                &params(&[("filter", "avatar_med"), ("id", "12"), ("filename", "me.png")]),
                false,
            )
            .unwrap();
        assert_eq!(url, "/media/cache/attachment/resize/avatar_med/12/me.png");
    }
}
