//! Session-based sign-in enforcement.

use super::{FilterResult, RequestFilter};
use crate::database::{sanitize_column_name, DatabaseDriver};
use crate::request::Request;
use crate::response::Response;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Session key holding the signed-in user's id
pub const USER_ID_KEY: &str = "userId";

/// Session key the originally requested path is saved under
pub const REDIRECT_PATH_KEY: &str = "_redirectPath";

/// Answers whether a user id still refers to a user
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Whether a user with this id exists
    async fn user_exists(&self, id: &str) -> bool;
}

/// Looks users up by primary key in a database table
pub struct TableUserLookup {
    driver: Arc<dyn DatabaseDriver>,
    table: String,
}

impl TableUserLookup {
    /// Look users up in `table` through `driver`
    #[must_use]
    pub fn new(driver: Arc<dyn DatabaseDriver>, table: &str) -> Self {
        Self {
            driver,
            table: sanitize_column_name(table),
        }
    }
}

#[async_trait]
impl UserLookup for TableUserLookup {
    async fn user_exists(&self, id: &str) -> bool {
        let query = format!("SELECT id FROM {} WHERE id = ? LIMIT 1", self.table);
        let key = id.parse::<i64>().map_or_else(|_| Value::from(id), Value::Integer);
        let rows = self.driver.execute_query(&query, &[key]).await;
        rows.iter().any(|row| !row.is_error())
    }
}

/// Redirects clients without a valid session user to a sign-in page
pub struct AuthenticationFilter {
    lookup: Arc<dyn UserLookup>,
    sign_in_url: String,
}

impl AuthenticationFilter {
    /// Create the filter
    #[must_use]
    pub fn new(lookup: Arc<dyn UserLookup>, sign_in_url: impl Into<String>) -> Self {
        Self {
            lookup,
            sign_in_url: sign_in_url.into(),
        }
    }

    /// Where unauthenticated clients are sent
    #[must_use]
    pub fn sign_in_url(&self) -> &str {
        &self.sign_in_url
    }
}

#[async_trait]
impl RequestFilter for AuthenticationFilter {
    async fn pre_process(&self, mut request: Request, mut response: Response) -> FilterResult {
        let user_id = request.session.get(USER_ID_KEY).map(str::to_owned);
        if let Some(id) = user_id {
            if self.lookup.user_exists(&id).await {
                return FilterResult::Continue(request, response);
            }
        }

        info!(
            path = %request.path,
            sign_in = %self.sign_in_url,
            "Redirecting unauthenticated request"
        );
        let path = request.path.clone();
        request.session.set(REDIRECT_PATH_KEY, path);
        response.set_redirect(&self.sign_in_url);
        FilterResult::Stop(request, response)
    }

    fn name(&self) -> &'static str {
        "AuthenticationFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{QuerySettings, SqliteConnection};

    async fn lookup() -> Arc<dyn UserLookup> {
        let db = SqliteConnection::connect("sqlite::memory:", 1, QuerySettings::default())
            .await
            .unwrap();
        db.execute_query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, email_address TEXT)",
            &[],
        )
        .await;
        db.execute_query(
            "INSERT INTO users (email_address) VALUES (?)",
            &[Value::from("john@test.com")],
        )
        .await;
        Arc::new(TableUserLookup::new(Arc::new(db), "users"))
    }

    #[tokio::test]
    async fn test_table_lookup() {
        let lookup = lookup().await;
        assert!(lookup.user_exists("1").await);
        assert!(!lookup.user_exists("2").await);
        assert!(!lookup.user_exists("nobody").await);
    }

    #[tokio::test]
    async fn test_signed_in_user_continues() {
        let filter = AuthenticationFilter::new(lookup().await, "/sessions/new");
        let mut request = Request::get("/hats");
        request.session.set(USER_ID_KEY, "1");

        let result = filter.pre_process(request, Response::new()).await;

        assert!(!result.is_stop());
        let (request, response) = result.into_parts();
        assert_eq!(response, Response::new());
        assert_eq!(request.session.get(REDIRECT_PATH_KEY), None);
    }

    #[tokio::test]
    async fn test_missing_user_is_redirected() {
        let filter = AuthenticationFilter::new(lookup().await, "/sessions/new");

        let result = filter.pre_process(Request::get("/hats"), Response::new()).await;

        assert!(result.is_stop());
        let (request, response) = result.into_parts();
        assert_eq!(response.status, 303);
        assert_eq!(response.header("Location"), Some("/sessions/new"));
        assert_eq!(request.session.get(REDIRECT_PATH_KEY), Some("/hats"));
    }

    #[tokio::test]
    async fn test_deleted_user_is_redirected() {
        let filter = AuthenticationFilter::new(lookup().await, "/sessions/new");
        let mut request = Request::get("/hats/3");
        request.session.set(USER_ID_KEY, "7");

        let result = filter.pre_process(request, Response::new()).await;
        assert!(result.is_stop());
        assert_eq!(filter.sign_in_url(), "/sessions/new");
    }
}
