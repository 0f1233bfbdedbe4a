use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn as_odata(self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

/// Description of a single Graph call.
///
/// Built with [`GraphRequest::get`] or [`GraphRequest::post`] and refined with
/// the OData query options Graph understands. The value carries everything a
/// [`GraphTransport`] needs, which keeps transports trivially fakeable.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub method: Method,
    pub path: String,
    pub select: Vec<String>,
    pub top: Option<u32>,
    pub order_by: Option<(String, Direction)>,
    pub body: Option<Value>,
}

impl GraphRequest {
    fn new(method: Method, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            select: Vec::new(),
            top: None,
            order_by: None,
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post<B: Serialize>(path: &str, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        let mut request = Self::new(Method::Post, path);
        request.body = Some(body);
        Ok(request)
    }

    /// Only request specific properties
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn top(mut self, n: u32) -> Self {
        self.top = Some(n);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    /// Render the absolute URL for this request against `base_url`
    pub fn url(&self, base_url: &str) -> Result<Url, ApiError> {
        let raw = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let mut url = Url::parse(&raw)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid request URL {}: {}", raw, e)))?;

        if !self.select.is_empty() || self.top.is_some() || self.order_by.is_some() {
            let mut query = url.query_pairs_mut();
            if !self.select.is_empty() {
                query.append_pair("$select", &self.select.join(","));
            }
            if let Some(top) = self.top {
                query.append_pair("$top", &top.to_string());
            }
            if let Some((field, direction)) = &self.order_by {
                query.append_pair("$orderby", &format!("{} {}", field, direction.as_odata()));
            }
        }
        Ok(url)
    }
}

/// Executes [`GraphRequest`]s.
///
/// Returns the decoded JSON body, or `None` when the service answered with an
/// empty body (e.g. `202 Accepted` from `sendMail`).
#[async_trait]
pub trait GraphTransport: Send + Sync {
    async fn perform(&self, request: &GraphRequest) -> Result<Option<Value>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://graph.microsoft.com/v1.0";

    fn query_of(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }

    #[test]
    fn test_path_gets_leading_slash() {
        assert_eq!(GraphRequest::get("me/sendMail").path, "/me/sendMail");
        assert_eq!(GraphRequest::get("/me").path, "/me");
    }

    #[test]
    fn test_url_without_options_has_no_query() {
        let url = GraphRequest::get("/me").url(BASE).unwrap();
        assert_eq!(url.as_str(), "https://graph.microsoft.com/v1.0/me");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_url_renders_odata_options() {
        let request = GraphRequest::get("/me/mailFolders/inbox/messages")
            .select(&["from", "isRead", "receivedDateTime", "subject"])
            .top(25)
            .order_by("receivedDateTime", Direction::Descending);

        let url = request.url(&format!("{}/", BASE)).unwrap();
        assert_eq!(url.path(), "/v1.0/me/mailFolders/inbox/messages");
        assert_eq!(
            query_of(&url),
            vec![
                ("$select".to_string(), "from,isRead,receivedDateTime,subject".to_string()),
                ("$top".to_string(), "25".to_string()),
                ("$orderby".to_string(), "receivedDateTime DESC".to_string()),
            ]
        );
    }

    #[test]
    fn test_post_carries_body() {
        let request = GraphRequest::post("/me/events", &serde_json::json!({ "subject": "Lunch" })).unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.unwrap()["subject"], "Lunch");
    }
}
