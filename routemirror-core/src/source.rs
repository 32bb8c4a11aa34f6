//! Source - Trait abstracting the live route table
//!
//! A source returns routes one page at a time. [`fetch_all_routes`] follows
//! the pages to the end and refuses to hand back a partial set, since a
//! partial live set would make the differ delete routes that still exist.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::route::{RawLiveRoute, RouteFilter};

/// Upper bound on pages followed for one route table
pub const MAX_PAGES: usize = 1_000;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or API error
    #[error("AWS error: {0}")]
    Aws(String),

    /// The source has more routes than it returned and cannot page further
    #[error("Route search for {route_table_id} returned a partial result")]
    Truncated { route_table_id: String },

    /// The source handed back a token it already returned
    #[error("Route search for {route_table_id} repeated page token {token}")]
    RepeatedToken {
        route_table_id: String,
        token: String,
    },

    #[error("Route search for {route_table_id} exceeded {max_pages} pages")]
    TooManyPages {
        route_table_id: String,
        max_pages: usize,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What follows a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// No more routes
    Complete,
    /// Fetch the next page with this token
    Next(String),
    /// More routes exist but the source cannot return them
    Truncated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutePage {
    pub routes: Vec<RawLiveRoute>,
    pub continuation: Continuation,
}

impl RoutePage {
    pub fn complete(routes: Vec<RawLiveRoute>) -> Self {
        Self {
            routes,
            continuation: Continuation::Complete,
        }
    }
}

/// Live route table lookups.
///
/// Implementations perform no filtering of their own beyond `filter`.
pub trait LiveRouteSource: Send + Sync {
    /// Name of this source (e.g., "ec2")
    fn name(&self) -> &'static str;

    /// Fetch one page of routes. `page_token` is `None` for the first page.
    fn search_routes<'a>(
        &'a self,
        route_table_id: &'a str,
        filter: &'a RouteFilter,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, SourceResult<RoutePage>>;
}

/// Fetch every route matching `filter`, following pagination to completion
pub async fn fetch_all_routes(
    source: &dyn LiveRouteSource,
    route_table_id: &str,
    filter: &RouteFilter,
) -> SourceResult<Vec<RawLiveRoute>> {
    let mut routes = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut token: Option<String> = None;

    for page_number in 1..=MAX_PAGES {
        let page = source
            .search_routes(route_table_id, filter, token.as_deref())
            .await?;
        log::debug!(
            "{} page {} for {}: {} routes",
            source.name(),
            page_number,
            route_table_id,
            page.routes.len()
        );
        routes.extend(page.routes);

        match page.continuation {
            Continuation::Complete => return Ok(routes),
            Continuation::Truncated => {
                return Err(SourceError::Truncated {
                    route_table_id: route_table_id.to_string(),
                });
            }
            Continuation::Next(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(SourceError::RepeatedToken {
                        route_table_id: route_table_id.to_string(),
                        token: next,
                    });
                }
                token = Some(next);
            }
        }
    }

    Err(SourceError::TooManyPages {
        route_table_id: route_table_id.to_string(),
        max_pages: MAX_PAGES,
    })
}
